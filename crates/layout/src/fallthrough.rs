//! Makes implicit fallthrough explicit before any block changes address.
//!
//! The allocator is about to relocate blocks arbitrarily, so "flow falls
//! into the next address" semantics must become real jumps first. A block
//! whose last instruction is an unconditional transfer is left alone; every
//! other modified block gets an appended symbolic jump to its program-order
//! successor.

use reflow_core::{
    Diagnostic, Error, IsaProvider, JumpCond, JumpKind, Memory, Result, RewriterCtx, RewriterEnv,
    SymbolicAddr, SymbolicPair,
};
use std::collections::HashMap;

/// Appends explicit successor jumps to every modified block that needs one.
///
/// The successor of a block is the immediately next element of `pairs` in
/// its given order; callers must pass the same stable order the client
/// produced the blocks in. A modified block with no successor that needs
/// one is a fatal [`Error::MissingSuccessor`].
///
/// Blocks ending in an indirect unconditional jump are counted as
/// unrelocatable terminators: they relocate fine, but their dynamic targets
/// cannot be retargeted, which downstream consumers may care about.
pub fn reify_fallthrough<P, M>(
    env: &RewriterEnv<'_, P, M>,
    ctx: &mut RewriterCtx,
    pairs: &mut [SymbolicPair<P::Insn, P::Tagged>],
) -> Result<()>
where
    P: IsaProvider,
    M: Memory,
{
    // Program-order successor index over all new symbolic blocks, modified
    // and unmodified alike.
    let mut successor: HashMap<SymbolicAddr, SymbolicAddr> = HashMap::with_capacity(pairs.len());
    for window in 0..pairs.len().saturating_sub(1) {
        successor.insert(
            pairs[window].rewritten.address().symbolic,
            pairs[window + 1].rewritten.address().symbolic,
        );
    }

    let mut appended = 0usize;
    for pair in pairs.iter_mut().filter(|p| p.status.is_modified()) {
        let info = pair.rewritten.address();
        let kind = env.isa.tagged_jump_kind(env.memory, pair.rewritten.last());

        if matches!(kind, JumpKind::IndirectJump { cond: JumpCond::Unconditional }) {
            ctx.stats.unrelocatable_term_count += 1;
            ctx.tell(Diagnostic::UnrelocatableTerminator { address: info.origin });
            continue;
        }
        if kind.is_unconditional_transfer() {
            continue;
        }

        let next = successor
            .get(&info.symbolic)
            .copied()
            .ok_or(Error::MissingSuccessor(info.origin))?;
        pair.rewritten.extend(env.isa.make_symbolic_jump(next));
        appended += 1;
        tracing::debug!(
            "appended fallthrough jump {} -> {} (origin {})",
            info.symbolic,
            next,
            info.origin
        );
    }

    tracing::debug!(
        "fallthrough reification complete: {appended} jumps appended across {} pairs",
        pairs.len()
    );
    Ok(())
}
