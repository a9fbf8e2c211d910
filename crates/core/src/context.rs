//! The environment and mutable state threaded through a rewriting run.
//!
//! Passes share one read-only environment (the ISA provider and the memory
//! reader) and one mutable context: counters, the redirection table, the
//! flat symbolic-address assignment map, and an ordered diagnostic log. All
//! mutation is sequential; the context is transient to a single run.

use crate::addr::{ConcreteAddr, SymbolSource, SymbolicAddr};
use crate::result::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Read-only collaborators shared by every pass.
#[derive(Debug, Clone, Copy)]
pub struct RewriterEnv<'a, P, M> {
    /// Architecture-specific instruction facts.
    pub isa: &'a P,
    /// Read-only access to the image bytes.
    pub memory: &'a M,
}

impl<'a, P, M> RewriterEnv<'a, P, M> {
    /// Bundles the collaborators for one run.
    pub fn new(isa: &'a P, memory: &'a M) -> Self {
        Self { isa, memory }
    }
}

/// Counters accumulated across the run.
///
/// Updates are commutative; the final counts are reported regardless of
/// which pass reached them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RewriteStats {
    /// Modified blocks too small to hold a redirection jump.
    pub small_block_count: u64,
    /// Modified blocks ending in a terminator that cannot be retargeted.
    pub unrelocatable_term_count: u64,
    /// Bytes of original-block slack consumed by placed code.
    pub reused_byte_count: u64,
    /// Modified blocks refused because their function is incomplete.
    pub incomplete_block_count: u64,
}

/// A non-fatal condition worth reporting alongside the layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Diagnostic {
    /// A modified original block cannot hold its redirection jump; the pair
    /// passes through unredirected.
    BlockTooSmallForRedirection {
        /// Size of the original block.
        original_size: u64,
        /// Size of the jump that did not fit.
        jump_size: u64,
        /// Address of the original block.
        address: ConcreteAddr,
        /// Human-readable description.
        detail: String,
    },
    /// A modified block belongs to a function discovery could not fully
    /// resolve; it is left in place.
    IncompleteFunctionSkipped {
        /// Address of the refused block.
        address: ConcreteAddr,
    },
    /// A modified block ends in an indirect unconditional jump, whose
    /// dynamic targets cannot be retargeted if they move.
    UnrelocatableTerminator {
        /// Address of the block's original.
        address: ConcreteAddr,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::BlockTooSmallForRedirection {
                original_size,
                jump_size,
                address,
                detail,
            } => write!(
                f,
                "block at {address} too small for redirection ({original_size} < {jump_size}): {detail}"
            ),
            Diagnostic::IncompleteFunctionSkipped { address } => {
                write!(f, "block at {address} belongs to an incomplete function, left in place")
            }
            Diagnostic::UnrelocatableTerminator { address } => {
                write!(f, "block at {address} ends in an unrelocatable terminator")
            }
        }
    }
}

/// Mutable state of one rewriting run.
pub struct RewriterCtx {
    /// Accumulated counters.
    pub stats: RewriteStats,
    /// Assignments of symbolic addresses to final concrete addresses,
    /// filled by the allocator.
    pub new_symbols: HashMap<SymbolicAddr, ConcreteAddr>,
    /// Public translation table original -> redirected, in emission order.
    pub block_mapping: Vec<(ConcreteAddr, ConcreteAddr)>,
    symbols: SymbolSource,
    log: Vec<Diagnostic>,
}

impl RewriterCtx {
    /// A context whose symbol source starts past `first_free_symbol`, so
    /// engine-minted ids never collide with client ids.
    pub fn new(first_free_symbol: u64) -> Self {
        Self {
            stats: RewriteStats::default(),
            new_symbols: HashMap::new(),
            block_mapping: Vec::new(),
            symbols: SymbolSource::starting_at(first_free_symbol),
            log: Vec::new(),
        }
    }

    /// Appends a diagnostic to the ordered log.
    pub fn tell(&mut self, diag: Diagnostic) {
        tracing::debug!("diagnostic: {diag}");
        self.log.push(diag);
    }

    /// Aborts the current pipeline with `err`.
    ///
    /// Previously accumulated diagnostics stay in the context; the entry
    /// point returns them alongside the error.
    pub fn fail<T>(&self, err: Error) -> Result<T> {
        tracing::warn!("rewriting aborted: {err}");
        Err(err)
    }

    /// Mints a fresh symbolic address.
    pub fn fresh_symbol(&mut self) -> SymbolicAddr {
        self.symbols.fresh()
    }

    /// The diagnostics emitted so far, in emission order.
    pub fn log(&self) -> &[Diagnostic] {
        &self.log
    }

    /// Consumes the context, returning the diagnostic log.
    pub fn into_log(self) -> Vec<Diagnostic> {
        self.log
    }
}
