use pocket_abi::{InferenceContext, Token, TokenBatch, Vocabulary, LAST_LOGITS};
use tracing::{debug, error, info, warn};

use super::{argmax, DecodeLoop, Generation, PieceError, StopHandle, StopReason};

impl<'a, C: InferenceContext, V: Vocabulary> DecodeLoop<'a, C, V> {
    /// Generate until a stop condition. Failures inside the loop end it early
    /// and keep whatever text was produced.
    pub fn run(mut self, max_new_tokens: usize, stop: &StopHandle) -> Generation {
        // Logits left in the context belong to an earlier request.
        if self.n_prompt == 0 {
            info!("[decode] empty prompt, nothing to continue");
            return self.finish(StopReason::EmptyPrompt);
        }
        info!(max_new_tokens, "[decode] generating");
        let reason = loop {
            if let Some(reason) = self.step(max_new_tokens, stop) {
                break reason;
            }
        };
        info!(
            n_generated = self.state.n_generated,
            n_cur = self.state.n_cur,
            ?reason,
            "[decode] finished"
        );
        self.finish(reason)
    }

    /// One iteration. `None` means keep going.
    fn step(&mut self, max_new_tokens: usize, stop: &StopHandle) -> Option<StopReason> {
        if self.state.n_generated >= max_new_tokens {
            return Some(StopReason::MaxTokens);
        }
        if self.state.n_cur >= self.n_ctx {
            return Some(StopReason::ContextFull);
        }
        if stop.is_requested() {
            info!("[decode] stop requested");
            return Some(StopReason::Cancelled);
        }

        let Some(token) = self
            .ctx
            .logits_ith(LAST_LOGITS, self.n_vocab)
            .and_then(argmax)
        else {
            error!("[decode] failed to get logits");
            return Some(StopReason::LogitsUnavailable);
        };

        if token == self.eos {
            info!("[decode] EOS token encountered");
            return Some(StopReason::EndOfSequence);
        }

        self.emit(token);

        let Some(mut batch) = self.ctx.batch(1) else {
            error!("[decode] batch allocation failed for generation step");
            return Some(StopReason::BatchUnavailable);
        };
        if let Err(e) = batch.push(token, self.state.n_cur as i32, self.seq, true) {
            error!("[decode] generation batch: {e}");
            return Some(StopReason::BatchUnavailable);
        }
        let status = self.ctx.decode(&batch);
        drop(batch);
        if status != 0 {
            error!(status, pos = self.state.n_cur, "[decode] llama_decode failed for next token");
            return Some(StopReason::DecodeFailed);
        }

        self.state.n_cur += 1;
        self.state.n_generated += 1;
        None
    }

    /// Append `token`'s text. Render failures are logged and skipped.
    fn emit(&mut self, token: Token) {
        match self.pieces.render(self.vocab, token) {
            Ok(bytes) => {
                debug!(token = token.0, len = bytes.len(), "[decode] piece");
                self.state.output.extend_from_slice(bytes);
                self.state.emitted.push(token);
            }
            Err(PieceError::Empty) => {
                warn!(token = token.0, "token_to_piece returned empty");
            }
            Err(PieceError::Failed(code)) => {
                warn!(token = token.0, code, "token_to_piece failed");
            }
        }
    }
}
