//! Orchestrates the rewriting passes under the selected layout strategy.
//!
//! `compact_layout` is the engine's single entry point. It resolves the
//! strategy once up front, refuses blocks of incomplete functions, promotes
//! loop siblings, reifies fallthrough, allocates addresses, materializes
//! padding, and finally redirects every modified original onto its copy.

use crate::alloc::Allocator;
use crate::cluster::{self, LoopClasses};
use crate::fallthrough::reify_fallthrough;
use crate::redirect::redirect_layout;
use crate::DiscoverySource;
use rand::seq::SliceRandom;
use reflow_core::{
    AddressAssignedBlock, AddressHeap, AssignedPair, ConcreteAddr, ConcreteBlock, Diagnostic,
    Error, InjectedCode, IsaProvider, LayoutPair, Memory, PlacedInjection, Result, RewriteStats,
    RewriteStatus, RewriterCtx, RewriterEnv, Seed, SlackChunk, SymbolicAddr, SymbolicPair,
};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Whether blocks belonging to one loop stay physically adjacent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStrategy {
    /// Blocks of one loop are relocated together, contiguously.
    KeepLoopBlocksTogether,
    /// Loop structure does not influence placement.
    IgnoreLoops,
}

/// Order in which block groups are offered to the allocator under the
/// compact strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactOrder {
    /// Largest group first: big items reuse the big slack chunks.
    Sorted,
    /// Deterministic Fisher-Yates shuffle driven by the seed.
    Randomized(Seed),
}

/// The client-selected layout strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutStrategy {
    /// Ignore slack entirely: every rewritten block goes to the fresh
    /// region and all original slack is filled with padding.
    Parallel(LoopStrategy),
    /// Pack rewritten blocks into recovered slack first.
    Compact(CompactOrder, LoopStrategy),
}

impl LayoutStrategy {
    /// The loop half of the strategy.
    pub fn loop_strategy(&self) -> LoopStrategy {
        match self {
            LayoutStrategy::Parallel(l) => *l,
            LayoutStrategy::Compact(_, l) => *l,
        }
    }
}

impl fmt::Display for LayoutStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loops = match self.loop_strategy() {
            LoopStrategy::KeepLoopBlocksTogether => "keep-loops",
            LoopStrategy::IgnoreLoops => "ignore-loops",
        };
        match self {
            LayoutStrategy::Parallel(_) => write!(f, "parallel/{loops}"),
            LayoutStrategy::Compact(CompactOrder::Sorted, _) => write!(f, "compact-sorted/{loops}"),
            LayoutStrategy::Compact(CompactOrder::Randomized(_), _) => {
                write!(f, "compact-random/{loops}")
            }
        }
    }
}

/// The engine's output: every input pair with a concrete placement, padding
/// for unused slack, and the placed injected blobs.
#[derive(Debug, Clone)]
pub struct Layout<I, T> {
    /// Every input pair, address-assigned, in input order. After
    /// redirection, modified originals hold their redirection jump.
    pub program_blocks: Vec<AssignedPair<I, T>>,
    /// Padding materialized into slack no block was placed in, in address
    /// order.
    pub padding_blocks: Vec<ConcreteBlock<I>>,
    /// Injected code blobs with their assigned addresses.
    pub injected_blocks: Vec<PlacedInjection>,
}

/// Everything a successful run produces.
#[derive(Debug)]
pub struct RewriteOutcome<I, T> {
    /// The assembled layout, already redirected.
    pub layout: Layout<I, T>,
    /// Flat table from symbolic address to final concrete address, covering
    /// every block (moved or not) and every injected blob.
    pub bindings: HashMap<SymbolicAddr, ConcreteAddr>,
    /// Public translation table original -> redirected, in emission order.
    pub block_mapping: Vec<(ConcreteAddr, ConcreteAddr)>,
    /// Final counter values.
    pub stats: RewriteStats,
    /// Ordered diagnostic log.
    pub log: Vec<Diagnostic>,
    /// One past the last byte the fresh region used.
    pub fresh_region_end: ConcreteAddr,
    /// Slack regions recovered from the modified originals, in input order.
    /// Every byte of these is owned by relocated code or padding.
    pub slack_regions: Vec<SlackChunk>,
}

/// A failed run: the fatal error plus the diagnostics accumulated before it.
#[derive(Debug)]
pub struct RewriteFailure {
    /// The error that aborted the pipeline.
    pub error: Error,
    /// Diagnostics emitted before the abort, in emission order.
    pub log: Vec<Diagnostic>,
}

impl fmt::Display for RewriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} diagnostics)", self.error, self.log.len())
    }
}

impl std::error::Error for RewriteFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Computes a layout for the rewritten blocks and redirects their originals.
///
/// `pairs` must be in the client's stable program order: the fallthrough
/// successor of a block is the next element of this sequence. `start_addr`
/// is the first byte of the fresh text region. Blocks whose function is
/// incomplete are counted and left in place, never relocated.
///
/// On success the layout, the assignment table, the redirection table, the
/// counters, and the diagnostic log are returned together; on failure the
/// log accumulated so far rides along with the error.
#[allow(clippy::too_many_arguments)]
pub fn compact_layout<P, M, D>(
    isa: &P,
    memory: &M,
    discovery: &mut D,
    start_addr: ConcreteAddr,
    strategy: LayoutStrategy,
    pairs: Vec<SymbolicPair<P::Insn, P::Tagged>>,
    injected: Vec<InjectedCode>,
) -> std::result::Result<RewriteOutcome<P::Insn, P::Tagged>, RewriteFailure>
where
    P: IsaProvider,
    M: Memory,
    D: DiscoverySource,
{
    let first_free = first_free_symbol(&pairs, &injected);
    let mut ctx = RewriterCtx::new(first_free);
    let env = RewriterEnv::new(isa, memory);

    match run(&env, &mut ctx, discovery, start_addr, &strategy, pairs, injected) {
        Ok((layout, bindings, fresh_region_end, slack_regions)) => Ok(RewriteOutcome {
            layout,
            bindings,
            block_mapping: std::mem::take(&mut ctx.block_mapping),
            stats: ctx.stats,
            log: ctx.into_log(),
            fresh_region_end,
            slack_regions,
        }),
        Err(error) => Err(RewriteFailure { error, log: ctx.into_log() }),
    }
}

/// Demotes modified pairs whose function discovery could not fully resolve.
fn refuse_incomplete<I, T, D: DiscoverySource>(
    discovery: &D,
    ctx: &mut RewriterCtx,
    pairs: &mut [SymbolicPair<I, T>],
    refused: &mut HashSet<ConcreteAddr>,
) {
    for pair in pairs.iter_mut().filter(|p| p.status.is_modified()) {
        let addr = pair.original.address();
        if discovery.is_incomplete_function(addr) {
            pair.status = RewriteStatus::Unmodified;
            refused.insert(addr);
            ctx.stats.incomplete_block_count += 1;
            ctx.tell(Diagnostic::IncompleteFunctionSkipped { address: addr });
        }
    }
}

fn first_free_symbol<I, T>(pairs: &[SymbolicPair<I, T>], injected: &[InjectedCode]) -> u64 {
    let from_pairs = pairs
        .iter()
        .map(|p| p.rewritten.address().symbolic.index() + 1)
        .max()
        .unwrap_or(0);
    let from_injected = injected.iter().map(|b| b.symbol.index() + 1).max().unwrap_or(0);
    from_pairs.max(from_injected)
}

type RunOutput<I, T> = (
    Layout<I, T>,
    HashMap<SymbolicAddr, ConcreteAddr>,
    ConcreteAddr,
    Vec<SlackChunk>,
);

fn run<P, M, D>(
    env: &RewriterEnv<'_, P, M>,
    ctx: &mut RewriterCtx,
    discovery: &mut D,
    start_addr: ConcreteAddr,
    strategy: &LayoutStrategy,
    mut pairs: Vec<SymbolicPair<P::Insn, P::Tagged>>,
    injected: Vec<InjectedCode>,
) -> Result<RunOutput<P::Insn, P::Tagged>>
where
    P: IsaProvider,
    M: Memory,
    D: DiscoverySource,
{
    // Resolve the strategy once; everything below works off plain values.
    let loop_strategy = strategy.loop_strategy();
    let use_slack = matches!(strategy, LayoutStrategy::Compact(..));
    tracing::debug!(
        "layout run: strategy {strategy}, {} pairs, {} injected blobs, fresh region at {start_addr}",
        pairs.len(),
        injected.len()
    );

    // Blocks of incomplete functions are refused outright.
    let mut incomplete: HashSet<ConcreteAddr> = HashSet::new();
    refuse_incomplete(&*discovery, ctx, &mut pairs, &mut incomplete);

    // Loop clustering, materialized only when the strategy asks for it.
    // Promotion runs before reification so promoted blocks also get
    // explicit terminal transfers.
    let classes = match loop_strategy {
        LoopStrategy::KeepLoopBlocksTogether => {
            let classes = cluster::loop_classes(discovery)?;
            let promoted = cluster::promote_loop_members(&classes, &incomplete, &mut pairs);
            tracing::debug!("promoted {promoted} loop siblings into the relocation set");
            // a promoted sibling may itself sit in an incomplete function;
            // the refusal wins over loop adjacency
            refuse_incomplete(&*discovery, ctx, &mut pairs, &mut incomplete);
            classes
        }
        LoopStrategy::IgnoreLoops => LoopClasses::default(),
    };

    reify_fallthrough(env, ctx, &mut pairs)?;

    // Group the relocation set. Each group is placed contiguously; members
    // are ordered by original address so neighbours stay neighbours.
    let groups = build_groups(&pairs, loop_strategy, &classes);

    // Slack recovered from modified originals, measured against the
    // reserved redirection-jump size.
    let redirect_size = env.isa.max_relative_jump_size();
    let mut slack: Vec<SlackChunk> = Vec::new();
    for pair in pairs.iter().filter(|p| p.status.is_modified()) {
        let size = pair.original.byte_size(env.isa);
        if size > redirect_size {
            slack.push(SlackChunk {
                size: size - redirect_size,
                addr: pair.original.address().advance(redirect_size)?,
            });
        }
    }
    tracing::debug!(
        "recovered {} slack chunks ({} bytes)",
        slack.len(),
        slack.iter().map(|c| c.size).sum::<u64>()
    );

    let heap: AddressHeap = if use_slack {
        slack.iter().copied().collect::<AddressHeap>()
    } else {
        AddressHeap::new()
    };
    let mut allocator = Allocator::new(start_addr, heap);

    // Offer the groups in strategy order.
    let ordered = order_groups(env.isa, &pairs, groups, strategy);
    for group in &ordered {
        let members: Vec<(SymbolicAddr, u64)> = group
            .iter()
            .map(|&i| {
                let info = pairs[i].rewritten.address();
                (info.symbolic, pairs[i].rewritten.byte_size(env.isa))
            })
            .collect();
        allocator.place_group(ctx, &members)?;
    }

    // Injected code blobs are placed after all blocks, one group each.
    let mut injected_blocks = Vec::with_capacity(injected.len());
    for blob in injected {
        let placed = allocator.place_group(ctx, &[(blob.symbol, blob.bytes.len() as u64)])?;
        injected_blocks.push(PlacedInjection {
            symbol: blob.symbol,
            address: placed.base,
            bytes: blob.bytes,
        });
    }

    // Every relocated block must have landed exactly once.
    for pair in pairs.iter().filter(|p| p.status.is_modified()) {
        let info = pair.rewritten.address();
        if !ctx.new_symbols.contains_key(&info.symbolic) {
            return ctx.fail(Error::UnassignedSymbolicBlock(info.origin));
        }
    }

    // Convert every pair: modified pairs get their assigned address,
    // unmodified pairs stay where they are.
    let mut bindings: HashMap<SymbolicAddr, ConcreteAddr> = HashMap::new();
    let mut program_blocks = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let info = pair.rewritten.address();
        let assigned = if pair.status.is_modified() {
            ctx.new_symbols[&info.symbolic]
        } else {
            pair.original.address()
        };
        bindings.insert(info.symbolic, assigned);
        program_blocks.push(LayoutPair {
            original: pair.original,
            rewritten: AddressAssignedBlock { block: pair.rewritten, assigned },
            status: pair.status,
        });
    }
    for placed in &injected_blocks {
        bindings.insert(placed.symbol, placed.address);
    }

    // Whatever slack survives allocation becomes padding. Under the
    // parallel strategy the heap is rebuilt from scratch so every slack
    // byte is padded.
    let fresh_region_end = allocator.cursor();
    let leftover: AddressHeap = if use_slack {
        allocator.into_heap()
    } else {
        slack.iter().copied().collect()
    };
    let mut padding_blocks = Vec::new();
    for chunk in leftover.into_sorted_by_addr() {
        padding_blocks.push(ConcreteBlock::new(
            chunk.addr,
            env.isa.make_padding(chunk.size),
        )?);
    }
    tracing::debug!(
        "layout assembled: {} program blocks, {} padding blocks, {} injected, fresh region ends at {fresh_region_end}",
        program_blocks.len(),
        padding_blocks.len(),
        injected_blocks.len()
    );

    let mut layout = Layout {
        program_blocks,
        padding_blocks,
        injected_blocks,
    };

    // Last stage before emission: patch the originals.
    redirect_layout(env, ctx, &mut layout)?;

    Ok((layout, bindings, fresh_region_end, slack))
}

/// Partitions the relocation set into contiguity groups, in input order.
fn build_groups<I, T>(
    pairs: &[SymbolicPair<I, T>],
    loop_strategy: LoopStrategy,
    classes: &LoopClasses,
) -> Vec<Vec<usize>> {
    let relocated: Vec<usize> = pairs
        .iter()
        .enumerate()
        .filter(|(_, p)| p.status.is_modified())
        .map(|(i, _)| i)
        .collect();

    match loop_strategy {
        LoopStrategy::IgnoreLoops => relocated.into_iter().map(|i| vec![i]).collect(),
        LoopStrategy::KeepLoopBlocksTogether => {
            let mut order: Vec<ConcreteAddr> = Vec::new();
            let mut by_class: HashMap<ConcreteAddr, Vec<usize>> = HashMap::new();
            for i in relocated {
                let rep = classes.representative(pairs[i].original.address());
                let group = by_class.entry(rep).or_insert_with(|| {
                    order.push(rep);
                    Vec::new()
                });
                group.push(i);
            }
            order
                .into_iter()
                .map(|rep| {
                    let mut group = by_class.remove(&rep).unwrap_or_default();
                    group.sort_by_key(|&i| pairs[i].original.address());
                    group
                })
                .collect()
        }
    }
}

/// Applies the strategy's group order: input order for parallel, largest
/// first for sorted, seeded Fisher-Yates for randomized.
fn order_groups<P: IsaProvider>(
    isa: &P,
    pairs: &[SymbolicPair<P::Insn, P::Tagged>],
    groups: Vec<Vec<usize>>,
    strategy: &LayoutStrategy,
) -> Vec<Vec<usize>> {
    match strategy {
        LayoutStrategy::Parallel(_) => groups,
        LayoutStrategy::Compact(CompactOrder::Sorted, _) => {
            let mut sized: Vec<(u64, Vec<usize>)> = groups
                .into_iter()
                .map(|g| {
                    let size = g.iter().map(|&i| pairs[i].rewritten.byte_size(isa)).sum();
                    (size, g)
                })
                .collect();
            // stable: equal sizes keep input order
            sized.sort_by(|a, b| b.0.cmp(&a.0));
            sized.into_iter().map(|(_, g)| g).collect()
        }
        LayoutStrategy::Compact(CompactOrder::Randomized(seed), _) => {
            let mut rng = seed.create_deterministic_rng();
            let mut shuffled = groups;
            shuffled.shuffle(&mut rng);
            shuffled
        }
    }
}
