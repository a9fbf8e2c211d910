//! Redirection and layout passes over client-rewritten basic blocks.
//!
//! The pipeline: cluster promotion keeps loops together, the fallthrough
//! reifier makes implicit control flow explicit, the allocator packs
//! rewritten blocks into recovered slack or a fresh text region, and the
//! redirector patches every modified original with a relative jump to its
//! relocated copy. [`compact_layout`] is the single entry point.

pub mod alloc;
pub mod cluster;
pub mod concretize;
pub mod driver;
pub mod fallthrough;
pub mod redirect;
pub mod report;
pub mod validate;

use reflow_core::{ConcreteAddr, Result};

pub use concretize::{concretize_block, concretize_layout};
pub use driver::{
    CompactOrder, Layout, LayoutStrategy, LoopStrategy, RewriteFailure, RewriteOutcome,
    compact_layout,
};
pub use report::RewriteReport;
pub use validate::validate_outcome;

/// A symbolic control-flow graph hint: block addresses as nodes, possible
/// transfers as edges. Only consulted for loop detection.
pub type Scfg = petgraph::graph::DiGraph<ConcreteAddr, ()>;

/// Discovery-side facts the engine consumes.
///
/// CFG materialization may be expensive (it invokes the symbolic-CFG
/// builder); the engine treats it as an opaque blocking call and caches the
/// result, so each function's CFG is materialized at most once per run.
pub trait DiscoverySource {
    /// Entry addresses of the functions discovery resolved, in a stable
    /// order.
    fn function_entries(&self) -> Vec<ConcreteAddr>;

    /// Builds the symbolic CFG of the function entered at `entry`.
    fn materialize_scfg(&mut self, entry: ConcreteAddr) -> Result<Scfg>;

    /// True when discovery could not resolve all control flow of the
    /// function containing `addr`; such blocks are never rewritten.
    fn is_incomplete_function(&self, addr: ConcreteAddr) -> bool;
}

/// A [`DiscoverySource`] with nothing to say, for clients that skip loop
/// clustering and have no incomplete functions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHints;

impl DiscoverySource for NoHints {
    fn function_entries(&self) -> Vec<ConcreteAddr> {
        Vec::new()
    }

    fn materialize_scfg(&mut self, entry: ConcreteAddr) -> Result<Scfg> {
        let mut scfg = Scfg::new();
        scfg.add_node(entry);
        Ok(scfg)
    }

    fn is_incomplete_function(&self, _addr: ConcreteAddr) -> bool {
        false
    }
}
