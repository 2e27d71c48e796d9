use thiserror::Error;

/// Everything that can go wrong between staging a model and returning text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("asset unavailable: {0}")]
    AssetUnavailable(String),

    #[error("failed to load model: {0}")]
    ModelLoadFailed(String),

    #[error("failed to create context: {0}")]
    ContextCreateFailed(String),

    #[error("model not loaded")]
    ModelNotLoaded,

    #[error("failed to tokenize prompt: {0}")]
    TokenizationFailed(String),

    #[error("prompt too long ({n_prompt} tokens, context {n_ctx}, max {max})")]
    PromptTooLong {
        n_prompt: usize,
        n_ctx: usize,
        max: usize,
    },

    #[error("prompt batch init failed: {0}")]
    BatchInitFailed(String),

    #[error("decode failed: {0}")]
    DecodeFailed(String),

    #[error("logits unavailable")]
    LogitsUnavailable,

    #[error("configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Short text handed back to host code that only understands strings.
    pub fn host_message(&self) -> String {
        let msg = match self {
            LlmError::AssetUnavailable(_) => "Model asset unavailable.",
            LlmError::ModelLoadFailed(_) => "Failed to load model.",
            LlmError::ContextCreateFailed(_) => "Failed to create context.",
            LlmError::ModelNotLoaded => "Model not loaded.",
            LlmError::TokenizationFailed(_) => "Failed to tokenize prompt.",
            LlmError::PromptTooLong { .. } => "Prompt too long.",
            LlmError::BatchInitFailed(_) => "Prompt batch init failed.",
            LlmError::DecodeFailed(_) => "llama_decode failed for prompt.",
            LlmError::LogitsUnavailable => "Failed to get logits.",
            LlmError::Config(_) => "Invalid configuration.",
        };
        format!("Error: {msg}")
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
