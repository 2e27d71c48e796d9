// llama-rs/src/batch.rs
//
// RAII wrapper over `llama_batch`: `llama_batch_init` on construction,
// `llama_batch_free` on drop, whatever path the caller leaves by.

use llama_cpp_sys_2::{llama_batch, llama_batch_free, llama_batch_init};
use pocket_abi::{Pos, SeqId, Token, TokenBatch};

pub struct LlamaBatch {
    raw: llama_batch,
    capacity: usize,
}

impl LlamaBatch {
    /// Token-mode batch (`embd = 0`) for a single sequence (`n_seq_max = 1`).
    /// `None` when llama.cpp could not allocate the token array.
    pub fn new(n_tokens: usize) -> Option<Self> {
        let n = i32::try_from(n_tokens).ok()?;
        let raw = unsafe { llama_batch_init(n, 0, 1) };
        let batch = Self {
            raw,
            capacity: n_tokens,
        };
        // Dropping `batch` frees whatever part did get allocated.
        if batch.raw.token.is_null() || batch.raw.pos.is_null() {
            return None;
        }
        Some(batch)
    }

    /// Value handed to `llama_decode`; the storage stays owned by `self`.
    #[inline]
    pub fn raw(&self) -> llama_batch {
        self.raw
    }
}

impl TokenBatch for LlamaBatch {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.raw.n_tokens.max(0) as usize
    }

    fn push(&mut self, token: Token, pos: Pos, seq: SeqId, logits: bool) -> Result<(), String> {
        let i = self.len();
        if i >= self.capacity {
            return Err(format!("batch full ({} slots)", self.capacity));
        }
        unsafe {
            if self.raw.seq_id.is_null() || self.raw.n_seq_id.is_null() {
                return Err("batch seq_id storage not allocated".into());
            }
            let seq_slot = *self.raw.seq_id.add(i);
            if seq_slot.is_null() {
                return Err(format!("batch seq_id[{i}] not allocated"));
            }

            *self.raw.token.add(i) = token.0;
            *self.raw.pos.add(i) = pos;
            *self.raw.n_seq_id.add(i) = 1;
            *seq_slot = seq.0;
            if !self.raw.logits.is_null() {
                *self.raw.logits.add(i) = logits as i8;
            }
        }
        self.raw.n_tokens += 1;
        Ok(())
    }
}

impl Drop for LlamaBatch {
    fn drop(&mut self) {
        unsafe { llama_batch_free(self.raw) };
    }
}
