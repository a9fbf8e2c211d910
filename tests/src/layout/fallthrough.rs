use crate::fixtures::*;
use reflow_core::{
    Diagnostic, Error, JumpCond, JumpKind, RewriteStatus, RewriterCtx, RewriterEnv,
};
use reflow_layout::fallthrough::reify_fallthrough;

fn ctx() -> RewriterCtx {
    RewriterCtx::new(100)
}

#[test]
fn conditional_jump_gets_a_fallthrough_to_the_next_block() {
    let isa = ToyIsa;
    let mem = no_memory();
    let env = RewriterEnv::new(&isa, &mem);
    let syms = symbols(2);

    let mut pairs = vec![
        pair(
            concrete(0x1000, vec![ToyInsn::Wide(5), ToyInsn::JmpIf(6)]),
            symbolic(
                syms[0],
                0x1000,
                vec![
                    ToyInsn::Wide(5).into(),
                    ToyTagged { insn: ToyInsn::JmpIf(0), target: Some(syms[1]) },
                ],
            ),
            RewriteStatus::Modified,
        ),
        pair(
            halting_block(0x1010, 6),
            halting_rewrite(syms[1], 0x1010, 6),
            RewriteStatus::Unmodified,
        ),
    ];

    let mut ctx = ctx();
    reify_fallthrough(&env, &mut ctx, &mut pairs).unwrap();

    let rewritten = &pairs[0].rewritten;
    assert_eq!(rewritten.len(), 3);
    let last = rewritten.last();
    assert_eq!(last.target, Some(syms[1]));
    assert!(matches!(last.insn, ToyInsn::Jmp(_)));
    // size grew by the appended jump
    assert_eq!(rewritten.byte_size(&isa), 15);
}

#[test]
fn call_terminated_blocks_need_a_fallthrough_too() {
    let isa = ToyIsa;
    let mem = no_memory();
    let env = RewriterEnv::new(&isa, &mem);
    let syms = symbols(2);

    let mut pairs = vec![
        pair(
            concrete(0x1000, vec![ToyInsn::Wide(3), ToyInsn::Call(100)]),
            symbolic(
                syms[0],
                0x1000,
                vec![ToyInsn::Wide(3).into(), ToyInsn::Call(100).into()],
            ),
            RewriteStatus::Modified,
        ),
        pair(
            halting_block(0x1008, 4),
            halting_rewrite(syms[1], 0x1008, 4),
            RewriteStatus::Unmodified,
        ),
    ];

    let mut ctx = ctx();
    reify_fallthrough(&env, &mut ctx, &mut pairs).unwrap();
    assert_eq!(pairs[0].rewritten.last().target, Some(syms[1]));
}

#[test]
fn blocks_ending_in_an_unconditional_transfer_are_untouched() {
    let isa = ToyIsa;
    let mem = no_memory();
    let env = RewriterEnv::new(&isa, &mem);
    let syms = symbols(2);

    let mut pairs = vec![
        pair(
            halting_block(0x1000, 8),
            halting_rewrite(syms[0], 0x1000, 8),
            RewriteStatus::Modified,
        ),
        pair(
            halting_block(0x1008, 4),
            halting_rewrite(syms[1], 0x1008, 4),
            RewriteStatus::Unmodified,
        ),
    ];

    let mut ctx = ctx();
    reify_fallthrough(&env, &mut ctx, &mut pairs).unwrap();
    assert_eq!(pairs[0].rewritten.len(), 2);
    assert_eq!(pairs[0].rewritten.byte_size(&isa), 8);
}

#[test]
fn unmodified_pairs_are_left_alone() {
    let isa = ToyIsa;
    let mem = no_memory();
    let env = RewriterEnv::new(&isa, &mem);
    let syms = symbols(2);

    // ends in a conditional jump but is unmodified, so no jump is appended
    let mut pairs = vec![
        pair(
            concrete(0x1000, vec![ToyInsn::Wide(5), ToyInsn::JmpIf(6)]),
            symbolic(
                syms[0],
                0x1000,
                vec![ToyInsn::Wide(5).into(), ToyInsn::JmpIf(6).into()],
            ),
            RewriteStatus::Unmodified,
        ),
        pair(
            halting_block(0x1010, 6),
            halting_rewrite(syms[1], 0x1010, 6),
            RewriteStatus::Unmodified,
        ),
    ];

    let mut ctx = ctx();
    reify_fallthrough(&env, &mut ctx, &mut pairs).unwrap();
    assert_eq!(pairs[0].rewritten.len(), 2);
}

#[test]
fn a_block_with_no_successor_is_a_fatal_error() {
    let isa = ToyIsa;
    let mem = no_memory();
    let env = RewriterEnv::new(&isa, &mem);
    let syms = symbols(1);

    let mut pairs = vec![pair(
        concrete(0x1000, vec![ToyInsn::Wide(3), ToyInsn::Op]),
        symbolic(
            syms[0],
            0x1000,
            vec![ToyInsn::Wide(3).into(), ToyInsn::Op.into()],
        ),
        RewriteStatus::Modified,
    )];

    let mut ctx = ctx();
    let err = reify_fallthrough(&env, &mut ctx, &mut pairs).unwrap_err();
    assert!(matches!(err, Error::MissingSuccessor(a) if a == addr(0x1000)));
}

#[test]
fn indirect_terminators_are_counted_but_not_rewritten() {
    let isa = ToyIsa;
    let mem = no_memory();
    let env = RewriterEnv::new(&isa, &mem);
    let syms = symbols(1);

    let mut pairs = vec![pair(
        concrete(0x1000, vec![ToyInsn::Wide(4), ToyInsn::JmpInd]),
        symbolic(
            syms[0],
            0x1000,
            vec![ToyInsn::Wide(4).into(), ToyInsn::JmpInd.into()],
        ),
        RewriteStatus::Modified,
    )];

    let mut ctx = ctx();
    reify_fallthrough(&env, &mut ctx, &mut pairs).unwrap();
    assert_eq!(ctx.stats.unrelocatable_term_count, 1);
    assert_eq!(pairs[0].rewritten.len(), 2);
    assert!(matches!(
        ctx.log()[0],
        Diagnostic::UnrelocatableTerminator { address } if address == addr(0x1000)
    ));
}

#[test]
fn tagged_kinds_classify_like_their_untagged_forms() {
    let isa = ToyIsa;
    let mem = no_memory();
    use reflow_core::IsaProvider;

    let halt: ToyTagged = ToyInsn::Halt.into();
    assert!(matches!(
        isa.tagged_jump_kind(&mem, &halt),
        JumpKind::Return { cond: JumpCond::Unconditional }
    ));
    let call: ToyTagged = ToyInsn::Call(4).into();
    assert!(isa.tagged_jump_kind(&mem, &call).needs_fallthrough());
}
