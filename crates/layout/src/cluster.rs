//! Loop-equivalence classes over block addresses.
//!
//! When the strategy keeps loop blocks together, blocks of the same loop are
//! laid out contiguously to preserve I-cache locality. The classes come from
//! the non-trivial strongly connected components of each function's symbolic
//! CFG hint, merged through a union-find and frozen into a representative
//! map. Any unmodified block sharing a class with a modified one is pulled
//! into the relocation set so the whole loop moves together.

use crate::{DiscoverySource, Scfg};
use petgraph::algo::tarjan_scc;
use petgraph::unionfind::UnionFind;
use reflow_core::{ConcreteAddr, Result, RewriteStatus, SymbolicPair};
use std::collections::{HashMap, HashSet};

/// Frozen loop-equivalence classes: block address to class representative.
///
/// Addresses absent from every loop are their own representative.
#[derive(Debug, Default, Clone)]
pub struct LoopClasses {
    representatives: HashMap<ConcreteAddr, ConcreteAddr>,
}

impl LoopClasses {
    /// The class representative of `addr`.
    pub fn representative(&self, addr: ConcreteAddr) -> ConcreteAddr {
        self.representatives.get(&addr).copied().unwrap_or(addr)
    }

    /// True when both addresses belong to the same loop class.
    pub fn same_class(&self, a: ConcreteAddr, b: ConcreteAddr) -> bool {
        self.representative(a) == self.representative(b)
    }

    /// Number of addresses that belong to some loop.
    pub fn len(&self) -> usize {
        self.representatives.len()
    }

    /// True when no loop was found.
    pub fn is_empty(&self) -> bool {
        self.representatives.is_empty()
    }
}

/// Computes loop-equivalence classes from the discovery hints.
///
/// Each function's CFG is materialized at most once and the classes are
/// frozen before layout proceeds; nothing here survives the run.
pub fn loop_classes<D: DiscoverySource>(discovery: &mut D) -> Result<LoopClasses> {
    let entries = discovery.function_entries();
    let mut cfgs: Vec<Scfg> = Vec::with_capacity(entries.len());
    let mut seen: HashSet<ConcreteAddr> = HashSet::new();
    for entry in &entries {
        // entries may repeat; materialize each CFG once
        if seen.insert(*entry) {
            cfgs.push(discovery.materialize_scfg(*entry)?);
        }
    }

    // Index every block address across all CFGs.
    let mut index: HashMap<ConcreteAddr, usize> = HashMap::new();
    let mut addrs: Vec<ConcreteAddr> = Vec::new();
    for cfg in &cfgs {
        for node in cfg.node_indices() {
            let addr = cfg[node];
            index.entry(addr).or_insert_with(|| {
                addrs.push(addr);
                addrs.len() - 1
            });
        }
    }

    let mut union: UnionFind<usize> = UnionFind::new(addrs.len());
    let mut loop_count = 0usize;
    for cfg in &cfgs {
        for component in tarjan_scc(cfg) {
            let trivial =
                component.len() == 1 && cfg.find_edge(component[0], component[0]).is_none();
            if trivial {
                continue;
            }
            loop_count += 1;
            let head = index[&cfg[component[0]]];
            for node in &component[1..] {
                union.union(head, index[&cfg[*node]]);
            }
        }
    }

    // Freeze, picking the lowest address of each class as its
    // representative so the choice is stable across runs.
    let mut lowest: HashMap<usize, ConcreteAddr> = HashMap::new();
    let mut class_sizes: HashMap<usize, usize> = HashMap::new();
    for (addr, &i) in &index {
        let root = union.find(i);
        *class_sizes.entry(root).or_insert(0) += 1;
        lowest
            .entry(root)
            .and_modify(|low| *low = (*low).min(*addr))
            .or_insert(*addr);
    }
    let mut representatives = HashMap::new();
    for (addr, &i) in &index {
        let root = union.find(i);
        // only record addresses that actually share a class
        if class_sizes[&root] > 1 || has_self_class(&cfgs, *addr) {
            representatives.insert(*addr, lowest[&root]);
        }
    }

    tracing::debug!(
        "loop clustering: {} functions, {} loops, {} clustered addresses",
        cfgs.len(),
        loop_count,
        representatives.len()
    );
    Ok(LoopClasses { representatives })
}

fn has_self_class(cfgs: &[Scfg], addr: ConcreteAddr) -> bool {
    cfgs.iter().any(|cfg| {
        cfg.node_indices()
            .any(|n| cfg[n] == addr && cfg.find_edge(n, n).is_some())
    })
}

/// Pulls unmodified blocks that share a loop class with a modified block
/// into the relocation set, so the whole loop moves together.
///
/// Blocks in `skip` (those refused for incomplete functions) are never
/// promoted. Returns the number of promoted pairs.
pub fn promote_loop_members<I, T>(
    classes: &LoopClasses,
    skip: &HashSet<ConcreteAddr>,
    pairs: &mut [SymbolicPair<I, T>],
) -> usize {
    let hot: HashSet<ConcreteAddr> = pairs
        .iter()
        .filter(|p| p.status.is_modified())
        .map(|p| classes.representative(p.original.address()))
        .collect();

    let mut promoted = 0usize;
    for pair in pairs.iter_mut() {
        if pair.status.is_modified() {
            continue;
        }
        let addr = pair.original.address();
        if skip.contains(&addr) {
            continue;
        }
        if classes.representatives.contains_key(&addr) && hot.contains(&classes.representative(addr))
        {
            pair.status = RewriteStatus::Modified;
            promoted += 1;
            tracing::debug!(
                "promoting block at {addr} into relocation set (loop head {})",
                classes.representative(addr)
            );
        }
    }
    promoted
}
