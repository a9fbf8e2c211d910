use crate::fixtures::*;
use reflow_core::{ConcreteAddr, Error, IsaProvider, JumpKind, Memory, Result, SymbolicAddr};
use reflow_layout::concretize_block;
use std::collections::HashMap;

#[test]
fn tagged_jumps_bind_through_the_assignment_table() {
    let isa = ToyIsa;
    let mem = no_memory();
    let syms = symbols(2);

    let block = symbolic(
        syms[0],
        0x1000,
        vec![
            ToyInsn::Wide(2).into(),
            ToyTagged { insn: ToyInsn::Jmp(0), target: Some(syms[1]) },
        ],
    );
    let bindings: HashMap<_, _> = [(syms[0], addr(0x5000)), (syms[1], addr(0x6000))]
        .into_iter()
        .collect();

    let lowered = concretize_block(&isa, &mem, &bindings, &block, addr(0x5000)).unwrap();
    assert_eq!(lowered.address(), addr(0x5000));
    // the jump sits at 0x5002 and must land on 0x6000
    let expected = addr(0x6000).distance_from(addr(0x5002 + 5)).unwrap();
    assert_eq!(lowered.instructions()[1], ToyInsn::Jmp(expected));
}

#[test]
fn untagged_instructions_pass_through() {
    let isa = ToyIsa;
    let mem = no_memory();
    let syms = symbols(1);

    let block = symbolic(syms[0], 0x1000, tag(vec![ToyInsn::Wide(3), ToyInsn::Halt]));
    let lowered =
        concretize_block(&isa, &mem, &HashMap::new(), &block, addr(0x7000)).unwrap();
    assert_eq!(lowered.instructions(), &[ToyInsn::Wide(3), ToyInsn::Halt]);
}

#[test]
fn a_missing_binding_is_fatal() {
    let isa = ToyIsa;
    let mem = no_memory();
    let syms = symbols(2);

    let block = symbolic(
        syms[0],
        0x1000,
        vec![ToyTagged { insn: ToyInsn::Jmp(0), target: Some(syms[1]) }],
    );
    let err = concretize_block(&isa, &mem, &HashMap::new(), &block, addr(0x5000)).unwrap_err();
    assert!(matches!(err, Error::UnassignedSymbolicBlock(a) if a == addr(0x1000)));
}

/// Delegates to the toy ISA but lies during concretization, shrinking every
/// bound jump to a one-byte halt.
struct ShrinkingIsa(ToyIsa);

impl IsaProvider for ShrinkingIsa {
    type Insn = ToyInsn;
    type Tagged = ToyTagged;

    fn insn_size(&self, insn: &ToyInsn) -> u64 {
        self.0.insn_size(insn)
    }
    fn tagged_size(&self, insn: &ToyTagged) -> u64 {
        self.0.tagged_size(insn)
    }
    fn jump_kind(&self, memory: &dyn Memory, at: ConcreteAddr, insn: &ToyInsn) -> JumpKind {
        self.0.jump_kind(memory, at, insn)
    }
    fn tagged_jump_kind(&self, memory: &dyn Memory, insn: &ToyTagged) -> JumpKind {
        self.0.tagged_jump_kind(memory, insn)
    }
    fn symbolic_target(&self, insn: &ToyTagged) -> Option<SymbolicAddr> {
        self.0.symbolic_target(insn)
    }
    fn make_relative_jump(&self, from: ConcreteAddr, to: ConcreteAddr) -> Result<Vec<ToyInsn>> {
        self.0.make_relative_jump(from, to)
    }
    fn modify_jump_target(
        &self,
        insn: ToyInsn,
        from: ConcreteAddr,
        to: ConcreteAddr,
    ) -> Option<ToyInsn> {
        self.0.modify_jump_target(insn, from, to)
    }
    fn make_padding(&self, bytes: u64) -> Vec<ToyInsn> {
        self.0.make_padding(bytes)
    }
    fn make_symbolic_jump(&self, target: SymbolicAddr) -> Vec<ToyTagged> {
        self.0.make_symbolic_jump(target)
    }
    fn make_symbolic_call(&self, target: SymbolicAddr) -> ToyTagged {
        self.0.make_symbolic_call(target)
    }
    fn max_relative_jump_size(&self) -> u64 {
        self.0.max_relative_jump_size()
    }
    fn concretize(
        &self,
        _memory: &dyn Memory,
        _at: ConcreteAddr,
        _insn: &ToyTagged,
        target: Option<ConcreteAddr>,
    ) -> Result<ToyInsn> {
        Ok(match target {
            Some(_) => ToyInsn::Halt,
            None => ToyInsn::Op,
        })
    }
}

#[test]
fn size_instability_during_concretization_is_fatal() {
    let isa = ShrinkingIsa(ToyIsa);
    let mem = no_memory();
    let syms = symbols(2);

    let block = symbolic(
        syms[0],
        0x1000,
        vec![ToyTagged { insn: ToyInsn::Jmp(0), target: Some(syms[1]) }],
    );
    let bindings: HashMap<_, _> = [(syms[1], addr(0x6000))].into_iter().collect();
    let err = concretize_block(&isa, &mem, &bindings, &block, addr(0x5000)).unwrap_err();
    assert!(matches!(
        err,
        Error::ConcretizationSizeMismatch { expected: 5, actual: 1, .. }
    ));
}
