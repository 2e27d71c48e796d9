//! One generation request: reset, tokenize, check the window, prime, decode.

use pocket_abi::{InferenceContext, Vocabulary};
use tracing::{error, info};

use crate::config::GenerationConfig;
use crate::engine::{DecodeLoop, Generation, StopHandle};
use crate::error::{LlmError, Result};
use crate::memory::reset_sequence;

/// Run one request against an already loaded model/context pair.
///
/// Clears the sequence's KV cache first, so successive calls on the same
/// context are independent. A prompt that leaves fewer than
/// `cfg.prompt_margin` free positions is rejected before any decode.
pub fn generate<C, V>(
    ctx: &mut C,
    vocab: &V,
    prompt: &str,
    cfg: &GenerationConfig,
    stop: &StopHandle,
) -> Result<Generation>
where
    C: InferenceContext,
    V: Vocabulary,
{
    info!(prompt_len = prompt.len(), "starting inference");
    let seq = cfg.seq();
    reset_sequence(ctx, seq);

    let tokens = vocab
        .tokenize(prompt, /* add_special */ true, /* parse_special */ false)
        .map_err(|e| {
            error!("failed to tokenize prompt: {e}");
            LlmError::TokenizationFailed(e)
        })?;

    let n_ctx = ctx.n_ctx();
    if tokens.len() + cfg.prompt_margin >= n_ctx {
        let max = n_ctx.saturating_sub(cfg.prompt_margin);
        error!(n_prompt = tokens.len(), max, "prompt is too long");
        return Err(LlmError::PromptTooLong {
            n_prompt: tokens.len(),
            n_ctx,
            max,
        });
    }

    let mut run = DecodeLoop::new(ctx, vocab, seq);
    run.prime(&tokens)?;
    let out = run.run(cfg.max_new_tokens, stop);
    info!(text_len = out.text.len(), stop = ?out.stop, "inference finished");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StopReason;
    use crate::mock::{MockBackend, MockScript, BOS, EOS};
    use pocket_abi::{SeqId, Token};

    fn cfg() -> GenerationConfig {
        GenerationConfig::default()
    }

    fn prompt_of(n_words: usize) -> String {
        vec!["a"; n_words].join(" ")
    }

    #[test]
    fn hello_produces_text_and_advances_the_cursor() {
        let backend = MockBackend::new(MockScript::chat().with_replies(&[4, 5, 6, EOS.0]));
        let (model, mut ctx) = backend.open();
        let out = generate(&mut ctx, &model, "Hello", &cfg(), &StopHandle::new()).unwrap();
        assert_eq!(out.text, ", world!");
        assert_eq!(out.n_prompt, 2);
        assert_eq!(out.n_cur, out.n_prompt + out.n_generated);
        assert_eq!(out.stop, StopReason::EndOfSequence);
    }

    #[test]
    fn prompt_is_tokenized_with_bos() {
        let backend = MockBackend::new(MockScript::chat());
        let (model, mut ctx) = backend.open();
        generate(&mut ctx, &model, "Hello world", &cfg(), &StopHandle::new()).unwrap();
        let prime: Vec<Token> = backend.ledger().decoded[0].iter().map(|s| s.token).collect();
        assert_eq!(prime, vec![BOS, Token(3), Token(5)]);
    }

    #[test]
    fn prompts_under_the_margin_are_primed_in_full() {
        // n_ctx 16, margin 4: up to 11 tokens fit (BOS + 10 words).
        let backend = MockBackend::new(MockScript::chat().with_n_ctx(16));
        let (model, mut ctx) = backend.open();
        let out = generate(&mut ctx, &model, &prompt_of(10), &cfg(), &StopHandle::new()).unwrap();
        assert_eq!(out.n_prompt, 11);
        let positions: Vec<i32> = backend.ledger().decoded[0].iter().map(|s| s.pos).collect();
        assert_eq!(positions, (0..11).collect::<Vec<_>>());
    }

    #[test]
    fn prompts_at_the_margin_are_rejected_without_decoding() {
        for words in [11, 12, 40] {
            let backend = MockBackend::new(MockScript::chat().with_n_ctx(16));
            let (model, mut ctx) = backend.open();
            let err = generate(&mut ctx, &model, &prompt_of(words), &cfg(), &StopHandle::new())
                .unwrap_err();
            assert!(matches!(err, LlmError::PromptTooLong { n_prompt, n_ctx: 16, max: 12 } if n_prompt == words + 1));
            assert!(backend.ledger().decoded.is_empty());
        }
    }

    #[test]
    fn tiny_context_rejects_everything() {
        let backend = MockBackend::new(MockScript::chat().with_n_ctx(3));
        let (model, mut ctx) = backend.open();
        let err = generate(&mut ctx, &model, "", &cfg(), &StopHandle::new()).unwrap_err();
        assert!(matches!(err, LlmError::PromptTooLong { max: 0, .. }));
    }

    #[test]
    fn tokenizer_errors_surface() {
        let backend = MockBackend::new(MockScript::chat());
        let (model, mut ctx) = backend.open();
        let err = generate(&mut ctx, &model, "Hello zebra", &cfg(), &StopHandle::new()).unwrap_err();
        assert!(matches!(err, LlmError::TokenizationFailed(_)));
    }

    #[test]
    fn repeated_requests_are_deterministic() {
        let backend = MockBackend::new(MockScript::chat().with_replies(&[3, 4, 5, 6, 14]));
        let (model, mut ctx) = backend.open();
        let first = generate(&mut ctx, &model, "Hello", &cfg(), &StopHandle::new()).unwrap();
        let second = generate(&mut ctx, &model, "Hello", &cfg(), &StopHandle::new()).unwrap();
        assert_eq!(first.text.as_bytes(), second.text.as_bytes());
        assert_eq!(first, second);
        // The reset left exactly the second request's history behind.
        assert_eq!(
            backend.ledger().kv_len(SeqId(0)),
            second.n_prompt + second.n_generated
        );
    }

    #[test]
    fn empty_prompt_after_a_request_ignores_leftover_logits() {
        // No BOS: an empty prompt tokenizes to nothing.
        let mut script = MockScript::chat();
        script.add_bos = false;
        let backend = MockBackend::new(script);
        let (model, mut ctx) = backend.open();

        let first = generate(&mut ctx, &model, "Hello", &cfg(), &StopHandle::new()).unwrap();
        assert_eq!(first.text, ", world!");
        let decodes = backend.ledger().decoded.len();

        let second = generate(&mut ctx, &model, "", &cfg(), &StopHandle::new()).unwrap();
        assert_eq!(second.text, "");
        assert_eq!(second.n_prompt, 0);
        assert_eq!(second.n_generated, 0);
        assert_eq!(second.stop, StopReason::EmptyPrompt);
        let ledger = backend.ledger();
        assert_eq!(ledger.decoded.len(), decodes);
        assert_eq!(ledger.kv_len(SeqId(0)), 0);
    }

    #[test]
    fn without_memory_reuse_collides_but_does_not_panic() {
        let mut script = MockScript::chat();
        script.memory_available = false;
        let backend = MockBackend::new(script);
        let (model, mut ctx) = backend.open();
        generate(&mut ctx, &model, "Hello", &cfg(), &StopHandle::new()).unwrap();
        // Stale positions make the fake engine refuse the second prompt.
        let err = generate(&mut ctx, &model, "Hello", &cfg(), &StopHandle::new()).unwrap_err();
        assert!(matches!(err, LlmError::DecodeFailed(_)));
    }
}
