//! Decode loop: prime the context with the prompt, then pick and feed back one
//! greedy token at a time until a stop condition.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use pocket_abi::{InferenceContext, SeqId, Token, Vocabulary};

// Child modules. `prefill` and `decode` extend `DecodeLoop` with its two phases.
mod decode;
mod greedy;
mod piece;
mod prefill;

pub use greedy::argmax;
pub use piece::{PieceBuffer, PieceError, INITIAL_PIECE_CAPACITY};

/// Why the loop stopped. Only a failed priming step is an error; every
/// reason here still yields the text produced so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Nothing was primed, so there is no row to sample from.
    EmptyPrompt,
    EndOfSequence,
    MaxTokens,
    ContextFull,
    Cancelled,
    LogitsUnavailable,
    DecodeFailed,
    BatchUnavailable,
}

impl StopReason {
    /// True for the normal endings (EOS, token cap, full context, empty prompt).
    pub fn is_natural(self) -> bool {
        matches!(
            self,
            StopReason::EmptyPrompt
                | StopReason::EndOfSequence
                | StopReason::MaxTokens
                | StopReason::ContextFull
        )
    }
}

/// Cooperative cancellation: checked once at the top of every decode step.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Per-request cursor state. Never outlives one `generate` call.
#[derive(Debug, Default)]
pub(crate) struct GenerationState {
    /// Absolute position of the next token to submit.
    n_cur: usize,
    /// Tokens decoded back into the context.
    n_generated: usize,
    /// Tokens whose text reached the output.
    emitted: Vec<Token>,
    output: Vec<u8>,
}

/// Result of one generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// Tokens whose text was appended to `text`, in order.
    pub tokens: Vec<Token>,
    pub n_prompt: usize,
    pub n_generated: usize,
    /// Final position cursor; `n_prompt + n_generated`.
    pub n_cur: usize,
    pub stop: StopReason,
}

/// One pass over a context for one request.
///
/// Vocabulary size, EOS and the context window are read fresh when the loop
/// is built and never reused across requests.
pub struct DecodeLoop<'a, C: InferenceContext, V: Vocabulary> {
    ctx: &'a mut C,
    vocab: &'a V,
    seq: SeqId,
    n_ctx: usize,
    n_vocab: usize,
    eos: Token,
    n_prompt: usize,
    pieces: PieceBuffer,
    state: GenerationState,
}

impl<'a, C: InferenceContext, V: Vocabulary> DecodeLoop<'a, C, V> {
    pub fn new(ctx: &'a mut C, vocab: &'a V, seq: SeqId) -> Self {
        let n_ctx = ctx.n_ctx();
        let n_vocab = vocab.n_tokens();
        let eos = vocab.eos();
        Self {
            ctx,
            vocab,
            seq,
            n_ctx,
            n_vocab,
            eos,
            n_prompt: 0,
            pieces: PieceBuffer::new(),
            state: GenerationState::default(),
        }
    }

    #[inline]
    pub fn n_cur(&self) -> usize {
        self.state.n_cur
    }

    #[inline]
    pub fn n_generated(&self) -> usize {
        self.state.n_generated
    }

    fn finish(self, stop: StopReason) -> Generation {
        let GenerationState {
            n_cur,
            n_generated,
            emitted,
            output,
        } = self.state;
        Generation {
            text: String::from_utf8_lossy(&output).into_owned(),
            tokens: emitted,
            n_prompt: self.n_prompt,
            n_generated,
            n_cur,
            stop,
        }
    }
}
