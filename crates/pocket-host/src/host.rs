//! The string-in, string-out surface a managed host talks to.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use pocket_abi::InferenceBackend;
use pocket_core::{Runtime, RuntimeConfig, StopHandle};
use tracing::{error, info, warn};

use crate::asset::{stage_asset, AssetSource};

/// One loaded model behind a lock. Every entry point takes the lock, so
/// requests never interleave on the same KV cache; only [`Host::cancel`]
/// bypasses it.
pub struct Host<B: InferenceBackend> {
    runtime: Mutex<Runtime<B>>,
    stop: StopHandle,
}

impl<B: InferenceBackend> Host<B> {
    pub fn new(backend: B, config: RuntimeConfig) -> Self {
        let runtime = Runtime::new(backend, config);
        let stop = runtime.stop_handle();
        Self {
            runtime: Mutex::new(runtime),
            stop,
        }
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime<B>> {
        self.runtime.lock().unwrap_or_else(|poisoned| {
            warn!("runtime lock poisoned by an earlier panic; recovering");
            poisoned.into_inner()
        })
    }

    /// Stage `model_file_name` from `assets` into `cache_dir` and load it.
    ///
    /// Returns `true` when a model is loaded afterwards, including when one
    /// already was (nothing is staged or reloaded in that case).
    pub fn load_model<S>(&self, assets: &S, model_file_name: &str, cache_dir: &Path) -> bool
    where
        S: AssetSource + ?Sized,
    {
        let mut rt = self.runtime();
        if rt.is_loaded() {
            info!("model already loaded");
            return true;
        }

        let path = match stage_asset(assets, model_file_name, cache_dir) {
            Ok(path) => path,
            Err(e) => {
                error!("{e}");
                return false;
            }
        };
        match rt.load(&path) {
            Ok(()) => true,
            Err(e) => {
                error!("{e}");
                false
            }
        }
    }

    pub fn unload_model(&self) {
        self.runtime().unload();
    }

    /// Greedy continuation of `prompt`. Failures come back as `"Error: ..."`.
    pub fn generate_text(&self, prompt: &str) -> String {
        match self.runtime().generate(prompt) {
            Ok(out) => out.text,
            Err(e) => e.host_message(),
        }
    }

    pub fn status(&self) -> String {
        self.runtime().status().to_string()
    }

    pub fn is_loaded(&self) -> bool {
        self.runtime().is_loaded()
    }

    /// Ask the running request, if any, to stop after its current token.
    pub fn cancel(&self) {
        info!("cancellation requested");
        self.stop.request();
    }
}
