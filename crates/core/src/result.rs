//! Core results and error types

use crate::addr::ConcreteAddr;
use thiserror::Error;

/// Core error type encompassing every fatal condition the engine can hit.
///
/// Non-fatal conditions (a block too small to redirect, an incomplete function
/// skipped) are not errors; they travel through the diagnostic log instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Offset arithmetic on a concrete address left the address space.
    #[error("address arithmetic overflow: {base:#x} {delta:+}")]
    AddressOverflow {
        /// The address the offset was applied to.
        base: u64,
        /// The offending signed byte delta.
        delta: i64,
    },

    /// The distance between two concrete addresses does not fit a signed delta.
    #[error("address delta from {from} to {to} out of range")]
    AddressDeltaOverflow {
        /// Start of the measured span.
        from: ConcreteAddr,
        /// End of the measured span.
        to: ConcreteAddr,
    },

    /// A concretized instruction changed size relative to its tagged form.
    #[error("concretization at {at} changed instruction size: expected {expected}, got {actual}")]
    ConcretizationSizeMismatch {
        /// Address the instruction was concretized at.
        at: ConcreteAddr,
        /// Size reported for the tagged form.
        expected: u64,
        /// Size of the emitted concrete form.
        actual: u64,
    },

    /// A basic block was constructed with no instructions.
    #[error("basic block at {0} has no instructions")]
    EmptyBlock(ConcreteAddr),

    /// A seed string contained non-hexadecimal characters.
    #[error("invalid hexadecimal in seed")]
    InvalidSeedHex,

    /// A seed string did not describe a whole number of 32-bit words.
    #[error("invalid seed length: expected a multiple of 8 hex chars, got {0}")]
    InvalidSeedLength(usize),

    /// The memory reader failed below the region lookup.
    #[error("memory read at {addr} failed: {reason}")]
    Memory {
        /// Address of the failed read.
        addr: ConcreteAddr,
        /// Description from the underlying reader.
        reason: String,
    },

    /// The fallthrough reifier found no program-order successor for a block
    /// that ends in implicit control flow.
    #[error("no program-order successor for block at {0}")]
    MissingSuccessor(ConcreteAddr),

    /// Discovery pointed at an address with no decodable byte region.
    #[error("no byte region mapped at {0}")]
    NoByteRegion(ConcreteAddr),

    /// Two placed regions were assigned intersecting address ranges.
    #[error("assigned regions overlap: {first} and {second}")]
    OverlappingAssignments {
        /// Start of the first region, by address order.
        first: ConcreteAddr,
        /// Start of the overlapping region.
        second: ConcreteAddr,
    },

    /// A decoded instruction straddles the end its block was discovered with.
    #[error("instruction at {insn_addr} runs to {next_addr}, past block end {stop_addr}")]
    OverlappingBlocks {
        /// Address of the straddling instruction.
        insn_addr: ConcreteAddr,
        /// Address one past the straddling instruction.
        next_addr: ConcreteAddr,
        /// Declared end of the block.
        stop_addr: ConcreteAddr,
    },

    /// A slack region was not exactly covered by placed blocks and padding.
    #[error("slack at {addr} has {covered} of {expected} bytes covered")]
    SlackNotCovered {
        /// Start of the slack region.
        addr: ConcreteAddr,
        /// Bytes accounted for by placed blocks and padding.
        covered: u64,
        /// Size of the slack region.
        expected: u64,
    },

    /// The allocator finished without assigning an address to a symbolic block.
    #[error("symbolic block rewritten from {0} was never assigned an address")]
    UnassignedSymbolicBlock(ConcreteAddr),

    /// No relative-jump encoding reaches from one address to the other.
    #[error("relative jump from {from} to {to} is unencodable")]
    UnencodableJump {
        /// Address the jump is written at.
        from: ConcreteAddr,
        /// Address the jump must land on.
        to: ConcreteAddr,
    },
}

/// Core result type
pub type Result<T> = std::result::Result<T, Error>;
