//! Vision-language model boundary for recibo.
//!
//! This crate keeps the model collaborator behind a single trait so the
//! extraction pipeline never depends on how generation actually happens:
//! - [`VisionBackend`] is the request/response contract
//! - [`CommandBackend`] drives an external VLM command line (e.g. `mlx_vlm.generate`)

mod backend;
mod error;
mod generation;

pub use backend::VisionBackend;
pub use backend::command::{CommandBackend, CommandSpec};
pub use error::InferenceError;
pub use generation::{Generation, GenerationStats};

/// Result type for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;
