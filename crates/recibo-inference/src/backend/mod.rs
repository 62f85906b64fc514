//! Vision backend implementations.

pub mod command;

use std::path::Path;

use crate::{Generation, Result};

/// Trait for vision-language model backends.
///
/// The pipeline hands the backend an image already materialized on disk, an
/// instruction prompt and a token budget, and gets free-form text back.
/// Implementations that cannot run generations concurrently must serialize
/// calls themselves; callers may invoke `generate` from several threads.
pub trait VisionBackend: Send + Sync {
    /// Run one generation over the image at `image`.
    fn generate(&self, image: &Path, prompt: &str, max_tokens: u32) -> Result<Generation>;

    /// Identifier of the loaded model.
    fn model_id(&self) -> &str;
}
