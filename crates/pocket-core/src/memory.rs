//! Sequence memory: clearing a sequence's KV cache before an unrelated request
//! reuses the same long-lived context.

use pocket_abi::{InferenceContext, SeqId, POS_END};
use tracing::{debug, warn};

/// What happened when a sequence was asked to forget its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// All cached positions for the sequence are gone.
    Cleared,
    /// The backend refused the removal; stale history may remain.
    Rejected,
    /// The context exposes no memory handle; nothing was cleared.
    Unavailable,
}

/// Remove every cached position of `seq`. Soft-fails: a warning is logged and
/// generation carries on with whatever the cache still holds.
pub fn reset_sequence<C: InferenceContext>(ctx: &mut C, seq: SeqId) -> ResetOutcome {
    match ctx.seq_rm(seq, 0, POS_END) {
        Some(true) => {
            debug!(seq = seq.0, "cleared KV cache for sequence");
            ResetOutcome::Cleared
        }
        Some(false) => {
            warn!(seq = seq.0, "backend rejected KV cache clear; stale history may bias output");
            ResetOutcome::Rejected
        }
        None => {
            warn!(seq = seq.0, "failed to get memory from context for KV cache clear");
            ResetOutcome::Unavailable
        }
    }
}
