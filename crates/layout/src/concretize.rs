//! Binds symbolic targets and emits final untagged blocks.
//!
//! Once layout has assigned every symbolic address, tagged instructions can
//! be lowered to their final encodings. The engine resolves each tag
//! through the flat binding table and hands the concrete target to the ISA
//! provider; the provider must emit exactly the size it reported for the
//! tagged form, which is checked here because the whole layout depends on
//! it.

use crate::driver::Layout;
use reflow_core::{
    ConcreteAddr, ConcreteBlock, Error, IsaProvider, Memory, Result, SymbolicAddr, SymbolicBlock,
};
use std::collections::HashMap;

/// Lowers one symbolic block placed at `at` to its concrete form.
pub fn concretize_block<P, M>(
    isa: &P,
    memory: &M,
    bindings: &HashMap<SymbolicAddr, ConcreteAddr>,
    block: &SymbolicBlock<P::Tagged>,
    at: ConcreteAddr,
) -> Result<ConcreteBlock<P::Insn>>
where
    P: IsaProvider,
    M: Memory,
{
    let mut lowered = Vec::with_capacity(block.len());
    let mut pc = at;
    for tagged in block.instructions() {
        let expected = isa.tagged_size(tagged);
        let target = match isa.symbolic_target(tagged) {
            Some(symbol) => Some(
                bindings
                    .get(&symbol)
                    .copied()
                    .ok_or(Error::UnassignedSymbolicBlock(block.address().origin))?,
            ),
            None => None,
        };
        let insn = isa.concretize(memory, pc, tagged, target)?;
        let actual = isa.insn_size(&insn);
        if actual != expected {
            return Err(Error::ConcretizationSizeMismatch { at: pc, expected, actual });
        }
        pc = pc.advance(actual)?;
        lowered.push(insn);
    }
    ConcreteBlock::new(at, lowered)
}

/// Lowers every relocated block of a finished layout, at its assigned
/// address, ready for the executable writer.
pub fn concretize_layout<P, M>(
    isa: &P,
    memory: &M,
    bindings: &HashMap<SymbolicAddr, ConcreteAddr>,
    layout: &Layout<P::Insn, P::Tagged>,
) -> Result<Vec<ConcreteBlock<P::Insn>>>
where
    P: IsaProvider,
    M: Memory,
{
    layout
        .program_blocks
        .iter()
        .filter(|p| p.status.is_modified())
        .map(|p| concretize_block(isa, memory, bindings, &p.rewritten.block, p.rewritten.assigned))
        .collect()
}
