// llama-rs/src/context.rs
//
// One llama.cpp context. All mutation (KV cache, decode, logits) lives here.

use std::ptr::NonNull;
use std::slice;

use llama_cpp_sys_2::{
    llama_context, llama_decode, llama_free, llama_get_logits_ith, llama_get_memory,
    llama_init_from_model, llama_memory_seq_rm, llama_n_ctx,
};
use pocket_abi::{ContextParams, InferenceContext, Pos, SeqId};
use tracing::debug;

use crate::batch::LlamaBatch;
use crate::ffi::context_params;
use crate::model::LlamaModel;

/// Context over a [`LlamaModel`].
///
/// Holds no borrow of the model: the owner must drop the context before the
/// model it was created from.
pub struct LlamaContext {
    ctx: NonNull<llama_context>,
}

impl LlamaContext {
    pub fn new(model: &LlamaModel, params: &ContextParams) -> Result<Self, String> {
        let p = context_params(params);
        debug!(
            n_ctx = p.n_ctx,
            n_batch = p.n_batch,
            n_threads = p.n_threads,
            "[ffi] llama_init_from_model"
        );
        let raw = unsafe { llama_init_from_model(model.as_ptr(), p) };
        NonNull::new(raw)
            .map(|ctx| Self { ctx })
            .ok_or_else(|| "llama_init_from_model returned null".to_string())
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut llama_context {
        self.ctx.as_ptr()
    }
}

impl InferenceContext for LlamaContext {
    type Batch = LlamaBatch;

    fn n_ctx(&self) -> usize {
        unsafe { llama_n_ctx(self.as_ptr()) as usize }
    }

    fn seq_rm(&mut self, seq: SeqId, p0: Pos, p1: Pos) -> Option<bool> {
        let mem = unsafe { llama_get_memory(self.as_ptr()) };
        if mem.is_null() {
            return None;
        }
        Some(unsafe { llama_memory_seq_rm(mem, seq.0, p0, p1) })
    }

    fn batch(&self, n_tokens: usize) -> Option<LlamaBatch> {
        LlamaBatch::new(n_tokens)
    }

    fn decode(&mut self, batch: &LlamaBatch) -> i32 {
        unsafe { llama_decode(self.as_ptr(), batch.raw()) }
    }

    fn logits_ith(&self, i: i32, n_vocab: usize) -> Option<&[f32]> {
        let ptr = unsafe { llama_get_logits_ith(self.as_ptr(), i) };
        if ptr.is_null() || n_vocab == 0 {
            return None;
        }
        // SAFETY: llama.cpp keeps one n_vocab-long row per output until the next decode,
        // and `decode` needs `&mut self`, so the row outlives this borrow.
        Some(unsafe { slice::from_raw_parts(ptr, n_vocab) })
    }
}

impl Drop for LlamaContext {
    fn drop(&mut self) {
        debug!("[ffi] llama_free(context)");
        unsafe { llama_free(self.ctx.as_ptr()) };
    }
}

// SAFETY: a context is only ever used by one thread at a time; the owner
// serializes access (the host keeps it behind a mutex).
unsafe impl Send for LlamaContext {}
