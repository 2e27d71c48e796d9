//! pocket-host: what a managed host calls into.
//!
//! [`Host`] serializes every request through one lock around the loaded
//! runtime, stages bundled model assets into a cache directory, and turns
//! failures into plain strings. With the `llama` feature the same surface is
//! exported over a C ABI.

pub mod asset;
pub mod host;
pub mod logging;
pub mod paths;

#[cfg(feature = "llama")]
pub mod ffi;

pub use asset::{stage_asset, AssetSource, DirAssetSource, STAGE_CHUNK};
pub use host::Host;
pub use logging::init_logging;
