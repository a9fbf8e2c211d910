//! Basic blocks in their three lifecycle stages.
//!
//! Discovery produces concrete blocks, the client rewrite produces symbolic
//! blocks, and the allocator derives address-assigned blocks. A block is an
//! ordered, never-empty instruction sequence plus a starting address; its
//! size is the sum of its instruction sizes, and instructions never straddle
//! the block's end.

use crate::addr::{ConcreteAddr, SymbolicAddr, SymbolicInfo};
use crate::isa::IsaProvider;
use crate::result::{Error, Result};

/// Gives every block address form a concrete provenance for error reporting.
pub trait BlockAddress: Copy {
    /// The concrete address this block originates from.
    fn origin(&self) -> ConcreteAddr;
}

impl BlockAddress for ConcreteAddr {
    fn origin(&self) -> ConcreteAddr {
        *self
    }
}

impl BlockAddress for SymbolicInfo {
    fn origin(&self) -> ConcreteAddr {
        self.origin
    }
}

/// An ordered, non-empty instruction sequence with a starting address.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock<A, I> {
    address: A,
    instructions: Vec<I>,
}

impl<A: BlockAddress, I> BasicBlock<A, I> {
    /// Builds a block, rejecting an empty instruction sequence.
    pub fn new(address: A, instructions: Vec<I>) -> Result<Self> {
        if instructions.is_empty() {
            return Err(Error::EmptyBlock(address.origin()));
        }
        Ok(Self { address, instructions })
    }

    /// The block's starting address.
    pub fn address(&self) -> A {
        self.address
    }

    /// The block's instructions, in execution order.
    pub fn instructions(&self) -> &[I] {
        &self.instructions
    }

    /// The block's final instruction.
    pub fn last(&self) -> &I {
        // the constructor rejects empty sequences
        self.instructions
            .last()
            .expect("basic block is never empty")
    }

    /// Appends instructions at the end of the block.
    pub fn extend(&mut self, tail: impl IntoIterator<Item = I>) {
        self.instructions.extend(tail);
    }

    /// Number of instructions in the block. Never zero.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }
}

/// A block whose address is a real machine address; instructions untagged.
pub type ConcreteBlock<I> = BasicBlock<ConcreteAddr, I>;

/// A block addressed by symbolic info; instructions carry optional symbolic
/// jump targets.
pub type SymbolicBlock<T> = BasicBlock<SymbolicInfo, T>;

impl<I> ConcreteBlock<I> {
    /// Total encoded size of the block, in bytes.
    pub fn byte_size<P>(&self, isa: &P) -> u64
    where
        P: IsaProvider<Insn = I>,
    {
        self.instructions.iter().map(|i| isa.insn_size(i)).sum()
    }

    /// One past the block's last byte.
    pub fn end<P>(&self, isa: &P) -> Result<ConcreteAddr>
    where
        P: IsaProvider<Insn = I>,
    {
        self.address.advance(self.byte_size(isa))
    }

    /// Builds a block from discovery output, verifying that the decoded
    /// instructions stop exactly at the reported block end.
    pub fn with_extent<P>(
        isa: &P,
        address: ConcreteAddr,
        instructions: Vec<I>,
        stop: ConcreteAddr,
    ) -> Result<Self>
    where
        P: IsaProvider<Insn = I>,
    {
        let mut at = address;
        for insn in &instructions {
            let next = at.advance(isa.insn_size(insn))?;
            if next > stop {
                return Err(Error::OverlappingBlocks {
                    insn_addr: at,
                    next_addr: next,
                    stop_addr: stop,
                });
            }
            at = next;
        }
        if at != stop {
            // decoded short of the reported end; same malformed-input class
            return Err(Error::OverlappingBlocks {
                insn_addr: at,
                next_addr: at,
                stop_addr: stop,
            });
        }
        Self::new(address, instructions)
    }
}

impl<T> SymbolicBlock<T> {
    /// Total encoded size of the block, in bytes.
    ///
    /// Sizes of tagged instructions are stable until concretization, so this
    /// is safe to use for layout before any address is known.
    pub fn byte_size<P>(&self, isa: &P) -> u64
    where
        P: IsaProvider<Tagged = T>,
    {
        self.instructions.iter().map(|i| isa.tagged_size(i)).sum()
    }
}

/// A symbolic block paired with the concrete address the allocator gave it.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressAssignedBlock<T> {
    /// The placed block.
    pub block: SymbolicBlock<T>,
    /// Where it will live in the output image.
    pub assigned: ConcreteAddr,
}

/// Whether the client rewrite changed a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteStatus {
    /// The rewritten form differs; the original gets redirected.
    Modified,
    /// The rewritten form is identity; the original stays byte-identical.
    Unmodified,
}

impl RewriteStatus {
    /// True for [`RewriteStatus::Modified`].
    pub fn is_modified(self) -> bool {
        matches!(self, RewriteStatus::Modified)
    }
}

/// The fundamental unit the engine processes: an original block, its
/// rewritten counterpart, and whether the rewrite changed anything.
///
/// Unmodified pairs are never redirected nor relocated, and their slack is
/// not reused.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPair<I, B> {
    /// The discovered block, at its original address.
    pub original: ConcreteBlock<I>,
    /// The client-rewritten counterpart.
    pub rewritten: B,
    /// Whether the rewrite changed the block.
    pub status: RewriteStatus,
}

/// A pair whose rewritten side is still symbolic.
pub type SymbolicPair<I, T> = LayoutPair<I, SymbolicBlock<T>>;

/// A pair whose rewritten side has been assigned a concrete address.
pub type AssignedPair<I, T> = LayoutPair<I, AddressAssignedBlock<T>>;

/// A client-supplied code blob to be placed by the allocator and referenced
/// through its symbolic address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedCode {
    /// The handle rewritten code refers to the blob by.
    pub symbol: SymbolicAddr,
    /// The raw bytes to place.
    pub bytes: Vec<u8>,
}

/// An injected blob after placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedInjection {
    /// The blob's symbolic handle.
    pub symbol: SymbolicAddr,
    /// The address the allocator placed it at.
    pub address: ConcreteAddr,
    /// The raw bytes to emit there.
    pub bytes: Vec<u8>,
}
