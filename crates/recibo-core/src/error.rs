//! Error types for the recibo-core library.

use thiserror::Error;

/// Main error type for the recibo library.
///
/// Unparseable model output is deliberately absent: it resolves to a
/// successful response with no extraction.
#[derive(Error, Debug)]
pub enum ReciboError {
    /// The request payload could not be decoded or is out of range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The model has not finished loading.
    #[error("model not loaded")]
    ServiceNotReady,

    /// The model could not be loaded.
    #[error("model load error: {0}")]
    ModelLoad(recibo_inference::InferenceError),

    /// The model collaborator failed during generation.
    #[error("generation error: {0}")]
    Generation(#[from] recibo_inference::InferenceError),

    /// I/O error (e.g. materializing the image for the model).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ReciboError {
    /// Whether the caller is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

/// Result type for the recibo library.
pub type Result<T> = std::result::Result<T, ReciboError>;
