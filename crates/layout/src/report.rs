//! Serializable summary of a rewriting run.
//!
//! Downstream consumers of the redirection table (debuggers, CFI patchers,
//! build tooling) want the mapping and the counters without holding the
//! whole layout in memory; this module renders them as JSON.

use crate::driver::{LayoutStrategy, RewriteOutcome};
use reflow_core::RewriteStats;
use serde::Serialize;

/// One redirected block, original address to relocated copy.
#[derive(Debug, Clone, Serialize)]
pub struct MappingEntry {
    /// Original block address, hex.
    pub original: String,
    /// Address of the relocated, instrumented copy, hex.
    pub redirected: String,
}

/// Summary of one rewriting run.
#[derive(Debug, Clone, Serialize)]
pub struct RewriteReport {
    /// Human-readable strategy name.
    pub strategy: String,
    /// First address of the fresh text region.
    pub fresh_region_start: String,
    /// One past the last fresh-region byte used.
    pub fresh_region_end: String,
    /// Redirections, in emission order.
    pub block_mapping: Vec<MappingEntry>,
    /// Final counter values.
    pub stats: RewriteStats,
    /// Number of program pairs in the layout.
    pub program_blocks: usize,
    /// Number of padding blocks materialized into unused slack.
    pub padding_blocks: usize,
    /// Number of injected blobs placed.
    pub injected_blocks: usize,
    /// Diagnostics, rendered, in emission order.
    pub diagnostics: Vec<String>,
}

impl RewriteReport {
    /// Builds the report for a finished run.
    pub fn from_outcome<I, T>(
        strategy: &LayoutStrategy,
        start_addr: reflow_core::ConcreteAddr,
        outcome: &RewriteOutcome<I, T>,
    ) -> Self {
        Self {
            strategy: strategy.to_string(),
            fresh_region_start: format!("{start_addr}"),
            fresh_region_end: format!("{}", outcome.fresh_region_end),
            block_mapping: outcome
                .block_mapping
                .iter()
                .map(|(original, redirected)| MappingEntry {
                    original: format!("{original}"),
                    redirected: format!("{redirected}"),
                })
                .collect(),
            stats: outcome.stats,
            program_blocks: outcome.layout.program_blocks.len(),
            padding_blocks: outcome.layout.padding_blocks.len(),
            injected_blocks: outcome.layout.injected_blocks.len(),
            diagnostics: outcome.log.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// Renders the report as compact JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Renders the report as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
