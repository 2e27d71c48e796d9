use pocket_abi::{InferenceContext, Token, TokenBatch, Vocabulary};
use tracing::{debug, error};

use super::DecodeLoop;
use crate::error::{LlmError, Result};

impl<'a, C: InferenceContext, V: Vocabulary> DecodeLoop<'a, C, V> {
    /// Feed the whole prompt as one batch at positions `0..n`, asking for
    /// logits on the last token only. Moves the cursor to `n`.
    ///
    /// The batch is released on every path out of here.
    pub fn prime(&mut self, prompt: &[Token]) -> Result<()> {
        self.n_prompt = prompt.len();
        self.state.n_cur = prompt.len();
        if prompt.is_empty() {
            debug!("[prefill] empty prompt, nothing to prime");
            return Ok(());
        }

        let mut batch = self.ctx.batch(prompt.len()).ok_or_else(|| {
            error!("[prefill] batch allocation failed for {} tokens", prompt.len());
            LlmError::BatchInitFailed(format!("no room for {} tokens", prompt.len()))
        })?;

        let last = prompt.len() - 1;
        for (i, &token) in prompt.iter().enumerate() {
            batch
                .push(token, i as i32, self.seq, i == last)
                .map_err(LlmError::BatchInitFailed)?;
        }

        let status = self.ctx.decode(&batch);
        if status != 0 {
            error!(status, "[prefill] llama_decode failed for prompt");
            return Err(LlmError::DecodeFailed(format!(
                "prompt decode returned {status}"
            )));
        }
        debug!(n_prompt = prompt.len(), "[prefill] prompt decoded");
        Ok(())
    }
}
