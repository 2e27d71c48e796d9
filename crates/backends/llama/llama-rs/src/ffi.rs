// llama-rs/src/ffi.rs
//
// Focused FFI helpers around llama.cpp.
// Start from upstream default_*_params() so new header fields keep their defaults.

use llama_cpp_sys_2::{
    llama_backend_free, llama_backend_init, llama_context_default_params, llama_context_params,
    llama_model_default_params, llama_model_params,
};
use pocket_abi::{ContextParams, ModelParams};
use tracing::debug;

use crate::params::resolve_threads;

/// Engage llama.cpp's process-wide state. Pair with [`deinit_backend`].
pub fn init_backend() {
    debug!("[ffi] llama_backend_init()");
    unsafe { llama_backend_init() };
}

pub fn deinit_backend() {
    debug!("[ffi] llama_backend_free()");
    unsafe { llama_backend_free() };
}

pub fn model_params(params: &ModelParams) -> llama_model_params {
    let mut p = unsafe { llama_model_default_params() };
    p.use_mmap = params.use_mmap;
    p.n_gpu_layers = params.n_gpu_layers;
    p
}

pub fn context_params(params: &ContextParams) -> llama_context_params {
    let mut p = unsafe { llama_context_default_params() };

    if let Some(n_ctx) = params.n_ctx {
        p.n_ctx = n_ctx;
    }
    if let Some(n_batch) = params.n_batch {
        p.n_batch = n_batch;
    }
    // One conversation per context.
    p.n_seq_max = 1;

    let threads = resolve_threads(params);
    p.n_threads = threads;
    p.n_threads_batch = threads;

    p
}
