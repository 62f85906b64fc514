//! Error types for the inference layer.

use thiserror::Error;

/// Errors that can occur while loading or invoking the vision model.
#[derive(Error, Debug)]
pub enum InferenceError {
    /// The model (or the program hosting it) could not be loaded.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Generation was attempted and failed.
    #[error("generation failed: {0}")]
    InferenceFailed(String),

    /// The model produced output that could not be read back.
    #[error("failed to read model output: {0}")]
    OutputExtraction(String),

    /// I/O error while talking to the model.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
