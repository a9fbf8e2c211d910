//! Concrete and symbolic code addresses.
//!
//! Concrete addresses are absolute machine addresses with checked offset
//! arithmetic; symbolic addresses are opaque identifiers standing in for "the
//! final address of a block that has not been placed yet". Layout binds the
//! two together through a single flat assignment table, so nothing in the
//! engine ever needs to chase pointers between blocks.

use crate::result::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An absolute code address.
///
/// Supports equality, total ordering, and checked offset arithmetic. Offset
/// arithmetic never silently wraps; leaving the address space is a fatal
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcreteAddr(u64);

impl ConcreteAddr {
    /// Wraps a raw machine address.
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw machine address.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Applies a signed byte offset, failing if the result leaves `u64`.
    pub fn offset(self, delta: i64) -> Result<Self> {
        let moved = if delta >= 0 {
            self.0.checked_add(delta as u64)
        } else {
            self.0.checked_sub(delta.unsigned_abs())
        };
        moved
            .map(Self)
            .ok_or(Error::AddressOverflow { base: self.0, delta })
    }

    /// Advances by an unsigned byte count, failing on overflow.
    ///
    /// Byte counts come from instruction sizes, which are always non-negative;
    /// this avoids a lossy cast at every call site of [`ConcreteAddr::offset`].
    pub fn advance(self, bytes: u64) -> Result<Self> {
        self.0.checked_add(bytes).map(Self).ok_or_else(|| Error::AddressOverflow {
            base: self.0,
            delta: i64::try_from(bytes).unwrap_or(i64::MAX),
        })
    }

    /// Computes `self - other` as a signed delta, failing when the distance
    /// does not fit `i64`.
    pub fn distance_from(self, other: ConcreteAddr) -> Result<i64> {
        let wide = self.0 as i128 - other.0 as i128;
        i64::try_from(wide).map_err(|_| Error::AddressDeltaOverflow {
            from: other,
            to: self,
        })
    }
}

impl fmt::Display for ConcreteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// An opaque identifier for the final address of a not-yet-placed block.
///
/// Symbolic addresses support equality only; they carry no order and no
/// arithmetic. Each rewritten block and each injected code blob gets exactly
/// one, and an identifier is never reused once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolicAddr(u64);

impl SymbolicAddr {
    /// Returns the raw identifier, for allocator bookkeeping.
    pub const fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SymbolicAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym#{}", self.0)
    }
}

/// A symbolic address paired with the concrete address it was rewritten from.
///
/// Layout needs both halves: the symbolic side to find successors and bind
/// placements, the concrete side to report provenance in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolicInfo {
    /// The opaque placement identifier.
    pub symbolic: SymbolicAddr,
    /// The concrete address of the original block this one was rewritten from.
    pub origin: ConcreteAddr,
}

impl SymbolicInfo {
    /// Pairs a symbolic address with its concrete origin.
    pub const fn new(symbolic: SymbolicAddr, origin: ConcreteAddr) -> Self {
        Self { symbolic, origin }
    }
}

/// Monotonic source of fresh symbolic addresses.
#[derive(Debug, Default, Clone)]
pub struct SymbolSource {
    next: u64,
}

impl SymbolSource {
    /// Starts numbering at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts numbering at `first`, for resuming past client-created ids.
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// Mints the next symbolic address.
    pub fn fresh(&mut self) -> SymbolicAddr {
        let sym = SymbolicAddr(self.next);
        self.next += 1;
        sym
    }
}
