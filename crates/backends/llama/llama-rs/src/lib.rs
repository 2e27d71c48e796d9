//! llama.cpp behind the pocket-abi traits.
//!
//! Everything that touches the C API sits behind the `native` feature; the
//! parameter helpers are plain Rust and always available.

pub mod params;

#[cfg(feature = "native")]
pub mod backend;
#[cfg(feature = "native")]
pub mod batch;
#[cfg(feature = "native")]
pub mod context;
#[cfg(feature = "native")]
pub mod ffi;
#[cfg(feature = "native")]
pub mod model;

#[cfg(feature = "native")]
pub use backend::LlamaBackend;
#[cfg(feature = "native")]
pub use context::LlamaContext;
#[cfg(feature = "native")]
pub use model::LlamaModel;
