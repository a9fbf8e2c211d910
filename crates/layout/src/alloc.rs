//! Assigns concrete addresses to groups of relocated blocks.
//!
//! Each group must stay contiguous. The allocator prefers the largest slack
//! chunk that fits; otherwise the group goes to the fresh region and the
//! cursor advances. Within a group, member addresses are a prefix sum of
//! member sizes from the group's base.

use reflow_core::{AddressHeap, ConcreteAddr, Result, RewriterCtx, SlackChunk, SymbolicAddr};

/// Where a group ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupPlacement {
    /// First address of the group.
    pub base: ConcreteAddr,
    /// True when the group reused slack instead of fresh space.
    pub from_slack: bool,
}

/// Placement state for one run: the fresh-region cursor plus the slack heap.
#[derive(Debug)]
pub struct Allocator {
    cursor: ConcreteAddr,
    heap: AddressHeap,
}

impl Allocator {
    /// Starts the fresh region at `start` with the given slack heap.
    pub fn new(start: ConcreteAddr, heap: AddressHeap) -> Self {
        Self { cursor: start, heap }
    }

    /// Current end of the fresh region.
    pub fn cursor(&self) -> ConcreteAddr {
        self.cursor
    }

    /// Remaining slack, for the padding pass.
    pub fn into_heap(self) -> AddressHeap {
        self.heap
    }

    /// Places one contiguous group; `members` are `(symbol, size)` in layout
    /// order. Records every member's address in `ctx.new_symbols` and
    /// accounts reused bytes.
    pub fn place_group(
        &mut self,
        ctx: &mut RewriterCtx,
        members: &[(SymbolicAddr, u64)],
    ) -> Result<GroupPlacement> {
        let total: u64 = members.iter().map(|(_, size)| size).sum();

        let placement = match self.heap.pop_fitting(total) {
            Some(chunk) => {
                if chunk.size > total {
                    self.heap.push(SlackChunk {
                        size: chunk.size - total,
                        addr: chunk.addr.advance(total)?,
                    });
                }
                ctx.stats.reused_byte_count += total;
                tracing::debug!(
                    "group of {} bytes reuses slack at {} ({} left in chunk)",
                    total,
                    chunk.addr,
                    chunk.size - total
                );
                GroupPlacement { base: chunk.addr, from_slack: true }
            }
            None => {
                let base = self.cursor;
                self.cursor = self.cursor.advance(total)?;
                tracing::debug!("group of {total} bytes goes to fresh region at {base}");
                GroupPlacement { base, from_slack: false }
            }
        };

        let mut at = placement.base;
        for (symbol, size) in members {
            let prev = ctx.new_symbols.insert(*symbol, at);
            debug_assert!(prev.is_none(), "symbol {symbol} placed twice");
            at = at.advance(*size)?;
        }
        Ok(placement)
    }
}
