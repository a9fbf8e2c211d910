//! Cross-cutting properties: determinism, slack accounting, injected code,
//! failure reporting.

use crate::fixtures::*;
use reflow_core::{Diagnostic, Error, RewriteStatus, Seed, SymbolicAddr};
use reflow_layout::{
    CompactOrder, LayoutStrategy, LoopStrategy, NoHints, RewriteReport, compact_layout,
    validate_outcome,
};

const FRESH: u64 = 0x10000;

fn varied_pairs(syms: &[SymbolicAddr]) -> Vec<reflow_core::SymbolicPair<ToyInsn, ToyTagged>> {
    // five modified pairs with distinct original and rewritten sizes
    let shapes: [(u64, u64, u64); 5] = [
        (0x1000, 30, 7),
        (0x2000, 18, 11),
        (0x3000, 22, 6),
        (0x4000, 40, 19),
        (0x5000, 12, 9),
    ];
    shapes
        .iter()
        .zip(syms)
        .map(|(&(at, orig_size, new_size), &sym)| {
            pair(
                halting_block(at, orig_size),
                halting_rewrite(sym, at, new_size),
                RewriteStatus::Modified,
            )
        })
        .collect()
}

#[test]
fn identical_seeds_give_identical_runs() {
    let isa = ToyIsa;
    let mem = no_memory();
    let syms = symbols(5);
    let seed = Seed::new(vec![0xdead_beef, 0x1234_5678]);

    let run = |seed: Seed| {
        compact_layout(
            &isa,
            &mem,
            &mut NoHints,
            addr(FRESH),
            LayoutStrategy::Compact(CompactOrder::Randomized(seed), LoopStrategy::IgnoreLoops),
            varied_pairs(&syms),
            vec![],
        )
        .unwrap()
    };

    let a = run(seed.clone());
    let b = run(seed);

    assert_eq!(a.bindings, b.bindings);
    assert_eq!(a.block_mapping, b.block_mapping);
    assert_eq!(a.fresh_region_end, b.fresh_region_end);
    assert_eq!(a.log, b.log);

    let strategy = LayoutStrategy::Compact(
        CompactOrder::Randomized(Seed::new(vec![0xdead_beef, 0x1234_5678])),
        LoopStrategy::IgnoreLoops,
    );
    let ra = RewriteReport::from_outcome(&strategy, addr(FRESH), &a);
    let rb = RewriteReport::from_outcome(&strategy, addr(FRESH), &b);
    assert_eq!(ra.to_json_pretty().unwrap(), rb.to_json_pretty().unwrap());

    validate_outcome(&isa, addr(FRESH), &a).unwrap();
}

#[test]
fn randomized_runs_still_satisfy_the_geometry() {
    let isa = ToyIsa;
    let mem = no_memory();
    for words in [vec![1u32], vec![2], vec![3, 4, 5]] {
        let syms = symbols(5);
        let outcome = compact_layout(
            &isa,
            &mem,
            &mut NoHints,
            addr(FRESH),
            LayoutStrategy::Compact(
                CompactOrder::Randomized(Seed::new(words)),
                LoopStrategy::IgnoreLoops,
            ),
            varied_pairs(&syms),
            vec![],
        )
        .unwrap();
        validate_outcome(&isa, addr(FRESH), &outcome).unwrap();
    }
}

#[test]
fn injected_code_reuses_slack_after_blocks() {
    let isa = ToyIsa;
    let mem = no_memory();
    let syms = symbols(4);

    // same shape as the sorted-compact scenario, plus one 5-byte blob
    let pairs = vec![
        pair(
            halting_block(0x1000, 25),
            halting_rewrite(syms[0], 0x1000, 6),
            RewriteStatus::Modified,
        ),
        pair(
            halting_block(0x2000, 15),
            halting_rewrite(syms[1], 0x2000, 9),
            RewriteStatus::Modified,
        ),
        pair(
            halting_block(0x3000, 15),
            halting_rewrite(syms[2], 0x3000, 12),
            RewriteStatus::Modified,
        ),
    ];

    let outcome = compact_layout(
        &isa,
        &mem,
        &mut NoHints,
        addr(FRESH),
        LayoutStrategy::Compact(CompactOrder::Sorted, LoopStrategy::IgnoreLoops),
        pairs,
        vec![blob(syms[3], vec![0x90; 5])],
    )
    .unwrap();

    // after the blocks, the largest leftover chunk is the 8 bytes at 0x1011
    let placed = &outcome.layout.injected_blocks[0];
    assert_eq!(placed.symbol, syms[3]);
    assert_eq!(placed.address, addr(0x1011));
    assert_eq!(outcome.bindings[&syms[3]], addr(0x1011));
    assert_eq!(outcome.stats.reused_byte_count, 27 + 5);
    assert_eq!(outcome.fresh_region_end, addr(FRESH));

    validate_outcome(&isa, addr(FRESH), &outcome).unwrap();
}

#[test]
fn unrelocatable_terminators_are_reported_but_still_relocated() {
    let isa = ToyIsa;
    let mem = no_memory();
    let syms = symbols(2);

    let pairs = vec![
        pair(
            concrete(0x1000, vec![ToyInsn::Wide(9), ToyInsn::JmpInd]),
            symbolic(
                syms[0],
                0x1000,
                vec![ToyInsn::Wide(4).into(), ToyInsn::JmpInd.into()],
            ),
            RewriteStatus::Modified,
        ),
        pair(
            halting_block(0x1010, 6),
            halting_rewrite(syms[1], 0x1010, 6),
            RewriteStatus::Unmodified,
        ),
    ];

    let outcome = compact_layout(
        &isa,
        &mem,
        &mut NoHints,
        addr(FRESH),
        LayoutStrategy::Parallel(LoopStrategy::IgnoreLoops),
        pairs,
        vec![],
    )
    .unwrap();

    assert_eq!(outcome.stats.unrelocatable_term_count, 1);
    assert!(matches!(
        outcome.log[0],
        Diagnostic::UnrelocatableTerminator { address } if address == addr(0x1000)
    ));
    // still moved and redirected
    assert_eq!(outcome.bindings[&syms[0]], addr(FRESH));
    assert_eq!(outcome.block_mapping, vec![(addr(0x1000), addr(FRESH))]);
}

#[test]
fn unreachable_fresh_region_fails_with_the_log_preserved() {
    let isa = ToyIsa;
    let mem = no_memory();
    let syms = symbols(1);

    let pairs = vec![pair(
        halting_block(0x1000, 10),
        halting_rewrite(syms[0], 0x1000, 10),
        RewriteStatus::Modified,
    )];

    // far beyond rel32 range from 0x1000
    let failure = compact_layout(
        &isa,
        &mem,
        &mut NoHints,
        addr(0x1_0000_0000),
        LayoutStrategy::Parallel(LoopStrategy::IgnoreLoops),
        pairs,
        vec![],
    )
    .unwrap_err();

    assert!(matches!(failure.error, Error::UnencodableJump { .. }));
    assert!(failure.log.is_empty());
}

#[test]
fn report_serializes_the_run_summary() {
    let isa = ToyIsa;
    let mem = no_memory();
    let syms = symbols(1);

    let strategy = LayoutStrategy::Parallel(LoopStrategy::KeepLoopBlocksTogether);
    let outcome = compact_layout(
        &isa,
        &mem,
        &mut ScriptedDiscovery::default(),
        addr(FRESH),
        strategy.clone(),
        vec![pair(
            halting_block(0x1000, 12),
            halting_rewrite(syms[0], 0x1000, 8),
            RewriteStatus::Modified,
        )],
        vec![],
    )
    .unwrap();

    let report = RewriteReport::from_outcome(&strategy, addr(FRESH), &outcome);
    let json: serde_json::Value =
        serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(json["strategy"], "parallel/keep-loops");
    assert_eq!(json["fresh_region_start"], "0x10000");
    assert_eq!(json["block_mapping"][0]["original"], "0x1000");
    assert_eq!(json["block_mapping"][0]["redirected"], "0x10000");
    assert_eq!(json["stats"]["reused_byte_count"], 0);
    assert_eq!(json["program_blocks"], 1);
}
