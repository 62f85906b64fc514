//! Core library for receipt OCR processing.
//!
//! This crate provides:
//! - Content hashing and a bounded LRU result cache
//! - Fast-path enrichment for well-known merchants
//! - Tolerant parsing of vision-model output into receipt data
//! - The extraction pipeline and the service facade built on top of it

pub mod cache;
pub mod error;
pub mod extraction;
pub mod models;
pub mod pipeline;
pub mod service;

pub use cache::{CacheStats, ContentHash, ResultCache};
pub use error::{ReciboError, Result};
pub use extraction::{FastPathMatcher, FastPathRule, parse_response};
pub use models::config::ReciboConfig;
pub use models::receipt::{Category, LineItem, Receipt};
pub use pipeline::{CacheStatus, CachedExtraction, ExtractResponse, ExtractionPipeline};
pub use service::{ExtractRequest, ExtractionService, HealthReport};

/// Re-export the model boundary.
pub use recibo_inference::{
    CommandBackend, CommandSpec, Generation, GenerationStats, InferenceError, VisionBackend,
};
