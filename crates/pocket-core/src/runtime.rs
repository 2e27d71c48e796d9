//! The loaded model/context pair and its lifecycle.
//!
//! `Runtime` is an ordinary owned value; whoever shares it across threads
//! wraps it in a lock. Teardown always runs context, then model, then the
//! backend disengage, whether it happens through `unload`, a failed `load`,
//! or the runtime being dropped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pocket_abi::InferenceBackend;
use tracing::{debug, error, info};

use crate::config::RuntimeConfig;
use crate::engine::{Generation, StopHandle};
use crate::error::{LlmError, Result};
use crate::session;

/// Holds one backend engagement; disengages on drop.
struct Engagement<B: InferenceBackend> {
    backend: Arc<B>,
}

impl<B: InferenceBackend> Engagement<B> {
    fn new(backend: &Arc<B>) -> Self {
        backend.engage();
        debug!(backend = backend.name(), "backend engaged");
        Self {
            backend: Arc::clone(backend),
        }
    }
}

impl<B: InferenceBackend> Drop for Engagement<B> {
    fn drop(&mut self) {
        self.backend.disengage();
        debug!(backend = self.backend.name(), "backend disengaged");
    }
}

// Field order is drop order: the context borrows the model's weights and the
// model needs the backend engaged.
struct Loaded<B: InferenceBackend> {
    context: B::Context,
    model: B::Model,
    engagement: Engagement<B>,
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeStatus {
    NotLoaded { backend: &'static str },
    Loaded { backend: &'static str, n_ctx: usize },
}

impl RuntimeStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, RuntimeStatus::Loaded { .. })
    }
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeStatus::Loaded { backend, .. } => {
                write!(f, "{backend} model loaded. Ready for inference!")
            }
            RuntimeStatus::NotLoaded { backend } => write!(f, "{backend} model not loaded yet."),
        }
    }
}

pub struct Runtime<B: InferenceBackend> {
    backend: Arc<B>,
    config: RuntimeConfig,
    stop: StopHandle,
    loaded: Option<Loaded<B>>,
}

impl<B: InferenceBackend> Runtime<B> {
    pub fn new(backend: B, config: RuntimeConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            config,
            stop: StopHandle::new(),
            loaded: None,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Handle that cancels the in-flight request at its next decode step.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.loaded.as_ref().map(|l| l.path.as_path())
    }

    pub fn context_size(&self) -> Option<usize> {
        use pocket_abi::InferenceContext;
        self.loaded.as_ref().map(|l| l.context.n_ctx())
    }

    pub fn status(&self) -> RuntimeStatus {
        let backend = self.backend.name();
        match self.context_size() {
            Some(n_ctx) => RuntimeStatus::Loaded { backend, n_ctx },
            None => RuntimeStatus::NotLoaded { backend },
        }
    }

    /// Engage the backend, load weights, create the context.
    ///
    /// Already loaded: returns `Ok` without touching anything (the new path is
    /// ignored). On failure everything acquired so far is released again.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        if let Some(loaded) = &self.loaded {
            info!(path = %loaded.path.display(), "model already loaded");
            return Ok(());
        }

        let engagement = Engagement::new(&self.backend);

        let model = self
            .backend
            .load_model(path, &self.config.model)
            .map_err(|e| {
                error!(path = %path.display(), "failed to load model: {e}");
                LlmError::ModelLoadFailed(e)
            })?;
        info!(path = %path.display(), "model loaded successfully");

        let context = self
            .backend
            .new_context(&model, &self.config.context)
            .map_err(|e| {
                error!("failed to create context: {e}");
                LlmError::ContextCreateFailed(e)
            })?;
        info!("context created successfully");

        self.loaded = Some(Loaded {
            context,
            model,
            engagement,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    /// Release context, model and engagement, in that order. No-op when
    /// nothing is loaded.
    pub fn unload(&mut self) {
        let Some(loaded) = self.loaded.take() else {
            debug!("unload requested with nothing loaded");
            return;
        };
        let Loaded {
            context,
            model,
            engagement,
            path,
        } = loaded;
        drop(context);
        info!("context freed");
        drop(model);
        info!(path = %path.display(), "model freed");
        drop(engagement);
        info!("backend freed");
    }

    /// Generate a continuation of `prompt` with the configured limits.
    pub fn generate(&mut self, prompt: &str) -> Result<Generation> {
        let Some(loaded) = self.loaded.as_mut() else {
            error!("model not loaded, cannot generate text");
            return Err(LlmError::ModelNotLoaded);
        };
        self.stop.clear();
        session::generate(
            &mut loaded.context,
            &loaded.model,
            prompt,
            &self.config.generation,
            &self.stop,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockScript};

    fn model_file() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    fn runtime(script: MockScript) -> (Runtime<MockBackend>, MockBackend) {
        let backend = MockBackend::new(script);
        (
            Runtime::new(backend.clone(), RuntimeConfig::default()),
            backend,
        )
    }

    #[test]
    fn generate_before_load_touches_nothing() {
        let (mut rt, backend) = runtime(MockScript::chat());
        assert_eq!(rt.generate("Hello"), Err(LlmError::ModelNotLoaded));
        let ledger = backend.ledger();
        assert_eq!(ledger.engage_calls, 0);
        assert_eq!(ledger.seq_rm_calls, 0);
        assert!(ledger.decoded.is_empty());
    }

    #[test]
    fn load_generate_unload() {
        let file = model_file();
        let (mut rt, backend) = runtime(MockScript::chat());
        rt.load(file.path()).unwrap();
        assert!(rt.is_loaded());
        assert_eq!(rt.model_path(), Some(file.path()));

        let out = rt.generate("Hello").unwrap();
        assert_eq!(out.text, ", world!");

        rt.unload();
        let ledger = backend.ledger();
        assert_eq!(ledger.drops, vec!["context", "model"]);
        assert_eq!(ledger.engage_calls, 1);
        assert_eq!(ledger.disengage_calls, 1);
        assert!(!rt.is_loaded());
    }

    #[test]
    fn second_load_is_a_successful_no_op() {
        let file = model_file();
        let (mut rt, backend) = runtime(MockScript::chat());
        rt.load(file.path()).unwrap();
        rt.load(Path::new("/definitely/not/here.gguf")).unwrap();
        let ledger = backend.ledger();
        assert_eq!(ledger.engage_calls, 1);
        assert_eq!(ledger.models_alive, 1);
        assert_eq!(rt.model_path(), Some(file.path()));
    }

    #[test]
    fn unload_is_idempotent() {
        let file = model_file();
        let (mut rt, backend) = runtime(MockScript::chat());
        rt.unload();
        rt.load(file.path()).unwrap();
        rt.unload();
        rt.unload();
        let ledger = backend.ledger();
        assert_eq!(ledger.engage_calls, ledger.disengage_calls);
        assert_eq!(ledger.disengage_calls, 1);
    }

    #[test]
    fn missing_file_fails_and_tears_down() {
        let (mut rt, backend) = runtime(MockScript::chat());
        let err = rt.load(Path::new("/nope/model.gguf")).unwrap_err();
        assert!(matches!(err, LlmError::ModelLoadFailed(_)));
        let ledger = backend.ledger();
        assert!(!ledger.engaged());
        assert_eq!(ledger.models_alive, 0);
        assert!(!rt.is_loaded());
    }

    #[test]
    fn context_failure_releases_the_model_and_engagement() {
        let file = model_file();
        let mut script = MockScript::chat();
        script.fail_context = true;
        let (mut rt, backend) = runtime(script);
        let err = rt.load(file.path()).unwrap_err();
        assert!(matches!(err, LlmError::ContextCreateFailed(_)));
        let ledger = backend.ledger();
        assert_eq!(ledger.models_alive, 0);
        assert_eq!(ledger.contexts_alive, 0);
        assert_eq!(ledger.engage_calls, 1);
        assert_eq!(ledger.disengage_calls, 1);
    }

    #[test]
    fn reload_after_unload_starts_fresh() {
        let file = model_file();
        let (mut rt, backend) = runtime(MockScript::chat());
        rt.load(file.path()).unwrap();
        let first = rt.generate("Hello").unwrap();
        rt.unload();
        rt.load(file.path()).unwrap();
        let second = rt.generate("Hello").unwrap();
        assert_eq!(first.text, second.text);

        let ledger = backend.ledger();
        assert_eq!(ledger.models_alive, 1);
        assert_eq!(ledger.contexts_alive, 1);
        assert_eq!(ledger.engage_calls, 2);
        assert_eq!(ledger.disengage_calls, 1);
    }

    #[test]
    fn dropping_the_runtime_tears_down_in_order() {
        let file = model_file();
        let (mut rt, backend) = runtime(MockScript::chat());
        rt.load(file.path()).unwrap();
        drop(rt);
        let ledger = backend.ledger();
        assert_eq!(ledger.drops, vec!["context", "model"]);
        assert!(!ledger.engaged());
    }

    #[test]
    fn status_text_tracks_lifecycle() {
        let file = model_file();
        let (mut rt, _) = runtime(MockScript::chat());
        assert_eq!(rt.status().to_string(), "mock model not loaded yet.");
        rt.load(file.path()).unwrap();
        assert_eq!(
            rt.status(),
            RuntimeStatus::Loaded {
                backend: "mock",
                n_ctx: 64
            }
        );
        assert_eq!(rt.status().to_string(), "mock model loaded. Ready for inference!");
    }

    #[test]
    fn configured_context_size_reaches_the_backend() {
        let file = model_file();
        let backend = MockBackend::new(MockScript::chat());
        let mut config = RuntimeConfig::default();
        config.context.n_ctx = Some(8);
        config.generation.max_new_tokens = 2;
        let mut rt = Runtime::new(backend, config);
        rt.load(file.path()).unwrap();
        assert_eq!(rt.context_size(), Some(8));
        assert_eq!(rt.generate("Hello").unwrap().n_generated, 2);
    }

    #[test]
    fn stop_flag_is_cleared_per_request() {
        let file = model_file();
        let (mut rt, _) = runtime(MockScript::chat());
        rt.load(file.path()).unwrap();
        rt.stop_handle().request();
        let out = rt.generate("Hello").unwrap();
        assert_eq!(out.text, ", world!");
    }
}
