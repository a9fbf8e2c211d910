//! The narrow capability set the engine consumes from an architecture.
//!
//! An ISA provider is constructed once by the architecture-specific
//! collaborator and passed by reference through the whole pipeline. The
//! engine never decodes bytes itself; everything it knows about an
//! instruction comes through this trait.
//!
//! The one promise the layout engine relies on absolutely: for any tagged
//! instruction, the size reported by [`IsaProvider::tagged_size`] is stable
//! from the moment the instruction is created until it is concretized, and
//! [`IsaProvider::concretize`] emits exactly that many bytes.

use crate::addr::{ConcreteAddr, SymbolicAddr};
use crate::memory::Memory;
use crate::result::Result;

/// Whether a control transfer always fires or only on a condition.
///
/// Calls are treated as conditional for block-ending purposes: execution
/// returns to the instruction after the call, so the block still needs an
/// explicit fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpCond {
    /// The transfer fires only when its condition holds.
    Conditional,
    /// The transfer always fires.
    Unconditional,
}

/// Classification of an instruction's effect on control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpKind {
    /// A pc-relative jump with a statically known displacement.
    RelativeJump {
        /// Conditionality of the transfer.
        cond: JumpCond,
        /// Resolved target, when the provider can compute it.
        target: Option<ConcreteAddr>,
        /// The encoded displacement.
        offset: i64,
    },
    /// A jump to an absolute address encoded in the instruction.
    AbsoluteJump {
        /// Conditionality of the transfer.
        cond: JumpCond,
        /// Resolved target, when the provider can compute it.
        target: Option<ConcreteAddr>,
    },
    /// A jump through a register or memory operand.
    IndirectJump {
        /// Conditionality of the transfer.
        cond: JumpCond,
    },
    /// A call with a statically known destination.
    DirectCall {
        /// Resolved callee, when the provider can compute it.
        target: Option<ConcreteAddr>,
        /// The encoded displacement.
        offset: i64,
    },
    /// A call through a register or memory operand.
    IndirectCall,
    /// A return to the caller.
    Return {
        /// Conditionality of the return.
        cond: JumpCond,
    },
    /// No effect on control flow.
    NoJump,
}

impl JumpKind {
    /// True when control can never fall past this instruction.
    ///
    /// Calls and conditional transfers are not unconditional for this
    /// purpose; blocks ending in them still need an explicit fallthrough
    /// before relocation.
    pub fn is_unconditional_transfer(&self) -> bool {
        matches!(
            self,
            JumpKind::RelativeJump { cond: JumpCond::Unconditional, .. }
                | JumpKind::AbsoluteJump { cond: JumpCond::Unconditional, .. }
                | JumpKind::IndirectJump { cond: JumpCond::Unconditional }
                | JumpKind::Return { cond: JumpCond::Unconditional }
        )
    }

    /// True when a block ending in this instruction needs an explicit jump
    /// appended before its address can change.
    pub fn needs_fallthrough(&self) -> bool {
        !self.is_unconditional_transfer()
    }
}

/// Architecture-specific instruction facts, as a capability record.
///
/// `Insn` is the untagged (fully concrete) instruction form used by concrete
/// blocks; `Tagged` carries an optional symbolic jump target and is used by
/// rewritten blocks until the allocator binds every target to an address.
pub trait IsaProvider {
    /// Fully concrete instruction form.
    type Insn: Clone;
    /// Instruction form annotated with an optional symbolic jump target.
    type Tagged: Clone;

    /// Encoded size of an untagged instruction, in bytes.
    fn insn_size(&self, insn: &Self::Insn) -> u64;

    /// Encoded size of a tagged instruction, in bytes.
    ///
    /// Must be stable from creation until concretization.
    fn tagged_size(&self, insn: &Self::Tagged) -> u64;

    /// Classifies an untagged instruction located at `at`.
    fn jump_kind(&self, memory: &dyn Memory, at: ConcreteAddr, insn: &Self::Insn) -> JumpKind;

    /// Classifies a tagged instruction.
    ///
    /// Tagged instructions have no address yet, so resolved targets in the
    /// returned kind are typically absent; conditionality is what matters.
    fn tagged_jump_kind(&self, memory: &dyn Memory, insn: &Self::Tagged) -> JumpKind;

    /// Reads the symbolic jump target annotation, if the instruction has one.
    fn symbolic_target(&self, insn: &Self::Tagged) -> Option<SymbolicAddr>;

    /// Builds an unconditional relative jump from `from` to `to`.
    ///
    /// Fails when no relative encoding spans the distance. Never silently
    /// truncates; the caller checks the resulting byte size against the
    /// space it has.
    fn make_relative_jump(&self, from: ConcreteAddr, to: ConcreteAddr) -> Result<Vec<Self::Insn>>;

    /// Retargets an existing jump at `from` to land on `to`, without changing
    /// its encoded size. Returns `None` when no same-size encoding reaches.
    fn modify_jump_target(
        &self,
        insn: Self::Insn,
        from: ConcreteAddr,
        to: ConcreteAddr,
    ) -> Option<Self::Insn>;

    /// Produces exactly `bytes` bytes of trap or no-op instructions.
    ///
    /// Padding is never executed on any control-flow path in a well-formed
    /// output.
    fn make_padding(&self, bytes: u64) -> Vec<Self::Insn>;

    /// Builds an unconditional jump to a symbolic target.
    fn make_symbolic_jump(&self, target: SymbolicAddr) -> Vec<Self::Tagged>;

    /// Builds a call to a symbolic target.
    fn make_symbolic_call(&self, target: SymbolicAddr) -> Self::Tagged;

    /// Size of the redirection jump the engine reserves at the head of every
    /// modified original block. Slack is measured against this.
    fn max_relative_jump_size(&self) -> u64;

    /// Emits the final untagged form of a tagged instruction placed at `at`.
    ///
    /// `target` is the concrete address the instruction's symbolic tag was
    /// bound to, or `None` for untagged-equivalent instructions. The result
    /// must be exactly [`IsaProvider::tagged_size`] bytes.
    fn concretize(
        &self,
        memory: &dyn Memory,
        at: ConcreteAddr,
        insn: &Self::Tagged,
        target: Option<ConcreteAddr>,
    ) -> Result<Self::Insn>;
}
