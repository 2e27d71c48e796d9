use serde::{Deserialize, Serialize};

/// Knobs applied when loading model weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    /// Map the weights file instead of reading it into memory.
    pub use_mmap: bool,
    /// Layers to offload to an accelerator; 0 keeps everything on CPU.
    pub n_gpu_layers: i32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            use_mmap: true,
            n_gpu_layers: 0,
        }
    }
}

/// Knobs applied when creating an inference context.
/// `None` leaves the backend's own default in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextParams {
    pub n_ctx: Option<u32>,
    pub n_batch: Option<u32>,
    pub n_threads: Option<i32>,
}
