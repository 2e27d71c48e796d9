use std::path::Path;

use pocket_abi::{ContextParams, InferenceBackend, ModelParams};

use crate::context::LlamaContext;
use crate::ffi::{deinit_backend, init_backend};
use crate::model::LlamaModel;

/// llama.cpp on the CPU (or whatever accelerator the build features enable).
#[derive(Debug, Default, Clone, Copy)]
pub struct LlamaBackend;

impl InferenceBackend for LlamaBackend {
    type Model = LlamaModel;
    type Context = LlamaContext;

    fn engage(&self) {
        init_backend();
    }

    fn disengage(&self) {
        deinit_backend();
    }

    fn load_model(&self, path: &Path, params: &ModelParams) -> Result<LlamaModel, String> {
        LlamaModel::load(path, params)
    }

    fn new_context(
        &self,
        model: &LlamaModel,
        params: &ContextParams,
    ) -> Result<LlamaContext, String> {
        LlamaContext::new(model, params)
    }

    fn name(&self) -> &'static str {
        "Llama.cpp"
    }
}
