//! pocket-core: owns the loaded model/context pair and drives greedy
//! autoregressive generation over any [`pocket_abi::InferenceBackend`].

pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod runtime;
pub mod session;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::{GenerationConfig, RuntimeConfig};
pub use engine::{Generation, StopHandle, StopReason};
pub use error::{LlmError, Result};
pub use runtime::{Runtime, RuntimeStatus};
pub use session::generate;
