//! Data model shared by the reflow binary rewriting engine.
//!
//! This crate holds everything the layout passes agree on: concrete and
//! symbolic addresses, basic blocks in their lifecycle stages, the narrow
//! ISA provider contract, read-only memory access, the slack heap, the
//! deterministic layout seed, and the rewriter context the passes thread
//! their state through.

pub mod addr;
pub mod block;
pub mod context;
pub mod heap;
pub mod isa;
pub mod memory;
pub mod result;
pub mod seed;

pub use addr::{ConcreteAddr, SymbolSource, SymbolicAddr, SymbolicInfo};
pub use block::{
    AddressAssignedBlock, AssignedPair, BasicBlock, BlockAddress, ConcreteBlock, InjectedCode,
    LayoutPair, PlacedInjection, RewriteStatus, SymbolicBlock, SymbolicPair,
};
pub use context::{Diagnostic, RewriteStats, RewriterCtx, RewriterEnv};
pub use heap::{AddressHeap, SlackChunk};
pub use isa::{IsaProvider, JumpCond, JumpKind};
pub use memory::{Memory, SliceMemory};
pub use result::{Error, Result};
pub use seed::Seed;
