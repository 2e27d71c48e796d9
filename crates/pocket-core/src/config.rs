//! Runtime configuration: defaults, optional JSON file, environment overrides.

use std::path::Path;
use std::str::FromStr;

use pocket_abi::{ContextParams, ModelParams, SeqId};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LlmError, Result};

/// Tokens generated per request unless configured otherwise.
pub const DEFAULT_MAX_NEW_TOKENS: usize = 128;

/// Free positions a prompt must leave in the context window.
pub const DEFAULT_PROMPT_MARGIN: usize = 4;

/// Per-request generation limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub prompt_margin: usize,
    /// Sequence the single conversation lives in.
    pub seq_id: i32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            prompt_margin: DEFAULT_PROMPT_MARGIN,
            seq_id: 0,
        }
    }
}

impl GenerationConfig {
    #[inline]
    pub fn seq(&self) -> SeqId {
        SeqId(self.seq_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub model: ModelParams,
    pub context: ContextParams,
    pub generation: GenerationConfig,
}

impl RuntimeConfig {
    /// Read a JSON config; missing fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LlmError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| LlmError::Config(format!("parse: {e}")))
    }

    /// Apply `POCKET_*` environment overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (tests pass a map here).
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var::<u32, _>(&lookup, "POCKET_N_CTX") {
            self.context.n_ctx = Some(v);
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "POCKET_N_BATCH") {
            self.context.n_batch = Some(v);
        }
        if let Some(v) = parse_var::<i32, _>(&lookup, "POCKET_N_THREADS") {
            self.context.n_threads = Some(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "POCKET_MAX_NEW_TOKENS") {
            self.generation.max_new_tokens = v;
        }
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable config override");
            None
        }
    }
}
