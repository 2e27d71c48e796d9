use crate::token::{Pos, SeqId, Token};

/// One submission unit for [`InferenceContext::decode`](crate::InferenceContext::decode).
///
/// Implementations own their native storage and release it in `Drop`, so a
/// batch is freed on every exit path of the code that allocated it.
pub trait TokenBatch {
    /// Number of token slots allocated.
    fn capacity(&self) -> usize;

    /// Number of tokens pushed so far.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one token. `logits` requests output for this position.
    /// Fails when the batch is full or its per-token sequence storage is missing.
    fn push(&mut self, token: Token, pos: Pos, seq: SeqId, logits: bool) -> Result<(), String>;
}
