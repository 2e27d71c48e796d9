use dirs::cache_dir;
use std::path::PathBuf;

/// ~/.cache/pocket-llm (or platform-equivalent)
pub fn pocket_home() -> PathBuf {
    cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pocket-llm")
}

/// ~/.cache/pocket-llm/models, where staged model files land by default.
pub fn default_cache_dir() -> PathBuf {
    pocket_home().join("models")
}
