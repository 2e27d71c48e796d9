//! pocket-abi: the contracts a native inference engine implements so the core
//! can drive it (tokenize, decode, logits, KV memory, batches, lifecycle).

pub mod backend;
pub mod batch;
pub mod params;
pub mod token;

pub use backend::*;
pub use batch::*;
pub use params::*;
pub use token::*;
