use std::path::Path;

use crate::batch::TokenBatch;
use crate::params::{ContextParams, ModelParams};
use crate::token::{Pos, SeqId, Token};

/// Tokenizer side of a loaded model.
pub trait Vocabulary {
    /// Vocabulary size; also the length of one logits row.
    fn n_tokens(&self) -> usize;

    /// Model's end-of-sequence token.
    fn eos(&self) -> Token;

    /// Convert text into token ids.
    /// `add_special` prepends BOS (and friends) when the model wants it;
    /// `parse_special` interprets special-token markup inside `text`.
    fn tokenize(&self, text: &str, add_special: bool, parse_special: bool)
        -> Result<Vec<Token>, String>;

    /// Render one token into `buf`.
    ///
    /// Returns the number of bytes written, or a negative value whose
    /// magnitude is the size `buf` would need. Never writes past `buf.len()`.
    fn token_to_piece(&self, token: Token, buf: &mut [u8], special: bool) -> i32;
}

/// One inference context: KV memory plus the forward pass.
pub trait InferenceContext {
    type Batch: TokenBatch;

    /// Context window (maximum number of positions).
    fn n_ctx(&self) -> usize;

    /// Remove cached KV for `seq` over `[p0, p1)`; `p1 < 0` means "to the end".
    ///
    /// `None` when the context exposes no memory handle, otherwise whether
    /// the backend accepted the removal.
    fn seq_rm(&mut self, seq: SeqId, p0: Pos, p1: Pos) -> Option<bool>;

    /// Allocate a token batch with room for `n_tokens`. `None` on allocation failure.
    fn batch(&self, n_tokens: usize) -> Option<Self::Batch>;

    /// Run the forward pass over `batch`. Zero means success.
    fn decode(&mut self, batch: &Self::Batch) -> i32;

    /// Logits row for output index `i` (negative counts from the end),
    /// `n_vocab` floats long. `None` when no logits are available.
    fn logits_ith(&self, i: i32, n_vocab: usize) -> Option<&[f32]>;
}

/// Lifecycle side of a native engine: process-wide engagement, weights, contexts.
///
/// A context created from a model must be dropped before that model.
pub trait InferenceBackend: Send + Sync {
    type Model: Vocabulary + Send;
    type Context: InferenceContext + Send;

    /// Engage process-wide backend resources. Balanced by [`disengage`](Self::disengage).
    fn engage(&self);

    fn disengage(&self);

    fn load_model(&self, path: &Path, params: &ModelParams) -> Result<Self::Model, String>;

    fn new_context(
        &self,
        model: &Self::Model,
        params: &ContextParams,
    ) -> Result<Self::Context, String>;

    /// Short backend name for logs and status text.
    fn name(&self) -> &'static str {
        "native"
    }
}
