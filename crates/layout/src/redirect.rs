//! Patches modified originals with jumps to their relocated copies.
//!
//! Last stage before emission. For each modified pair the redirector builds
//! a relative jump from the original's address to the assigned address and
//! overwrites the original's first bytes with it. Blocks too small to hold
//! the jump are reported and passed through untouched.

use crate::driver::Layout;
use reflow_core::{
    ConcreteBlock, Diagnostic, IsaProvider, Memory, Result, RewriteStatus, RewriterCtx,
    RewriterEnv,
};

/// Rewrites every modified original in `layout` into a redirection jump.
///
/// The jump plus padding covers exactly the reserved redirection region
/// (`max_relative_jump_size`, capped at the block size); bytes past it are
/// slack, owned by the allocator's placements and the padding pass.
/// Unmodified pairs are never touched. A pair whose block cannot hold the
/// jump reverts to [`RewriteStatus::Unmodified`] and is recorded in the
/// diagnostic log.
pub fn redirect_layout<P, M>(
    env: &RewriterEnv<'_, P, M>,
    ctx: &mut RewriterCtx,
    layout: &mut Layout<P::Insn, P::Tagged>,
) -> Result<()>
where
    P: IsaProvider,
    M: Memory,
{
    let reserved = env.isa.max_relative_jump_size();

    for pair in &mut layout.program_blocks {
        if !pair.status.is_modified() {
            continue;
        }
        let addr = pair.original.address();
        let target = pair.rewritten.assigned;

        let jump = env.isa.make_relative_jump(addr, target)?;
        let jump_size: u64 = jump.iter().map(|i| env.isa.insn_size(i)).sum();
        let original_size = pair.original.byte_size(env.isa);

        if original_size < jump_size {
            ctx.stats.small_block_count += 1;
            ctx.tell(Diagnostic::BlockTooSmallForRedirection {
                original_size,
                jump_size,
                address: addr,
                detail: format!(
                    "{original_size}-byte block at {addr} cannot hold a {jump_size}-byte jump to {target}"
                ),
            });
            pair.status = RewriteStatus::Unmodified;
            continue;
        }

        let mut patched = jump;
        let pad = original_size.min(reserved).saturating_sub(jump_size);
        patched.extend(env.isa.make_padding(pad));
        pair.original = ConcreteBlock::new(addr, patched)?;
        ctx.block_mapping.push((addr, target));
        tracing::debug!("redirected {addr} -> {target} ({jump_size}-byte jump, {pad} pad bytes)");
    }

    tracing::debug!(
        "redirection complete: {} blocks redirected, {} too small",
        ctx.block_mapping.len(),
        ctx.stats.small_block_count
    );
    Ok(())
}
