//! Per-request extraction pipeline.
//!
//! `hash → cache lookup → (hit) | (materialize → generate → parse → enrich → store)`.
//! A cache hit never reaches the model, and only successful parses are
//! stored, so every hit carries a usable extraction.

use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, ContentHash, ResultCache};
use crate::error::Result;
use crate::extraction::{DEFAULT_EXTRACTION_PROMPT, FastPathMatcher, parse_response};
use crate::models::receipt::Receipt;
use recibo_inference::{GenerationStats, VisionBackend};

/// Whether a response was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// What the cache keeps for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedExtraction {
    pub receipt: Receipt,
    pub raw_text: String,
    pub stats: GenerationStats,
}

/// Response envelope returned for every extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractResponse {
    /// Always `"ok"` for a completed request.
    pub status: String,
    /// Parsed receipt, or `None` when the model output held no JSON object.
    pub extraction: Option<Receipt>,
    /// Model output exactly as generated.
    pub raw_text: String,
    pub stats: GenerationStats,
    pub cache: CacheStatus,
    /// 16-character prefix of the image's SHA-256.
    pub content_hash: String,
}

impl ExtractResponse {
    fn new(
        extraction: Option<Receipt>,
        raw_text: String,
        stats: GenerationStats,
        cache: CacheStatus,
        hash: &ContentHash,
    ) -> Self {
        Self {
            status: "ok".to_string(),
            extraction,
            raw_text,
            stats,
            cache,
            content_hash: hash.short(),
        }
    }
}

/// One image to extract.
#[derive(Debug, Clone, Copy)]
pub struct ImageJob<'a> {
    /// Decoded image bytes.
    pub bytes: &'a [u8],
    /// Declared MIME type (used for the temporary file's extension).
    pub mime_type: &'a str,
    /// Prompt override.
    pub prompt: Option<&'a str>,
    /// Token budget override.
    pub max_tokens: Option<u32>,
}

/// Cache-fronted extraction over a vision backend.
pub struct ExtractionPipeline {
    cache: Mutex<ResultCache<CachedExtraction>>,
    matcher: FastPathMatcher,
    default_max_tokens: u32,
}

impl ExtractionPipeline {
    /// Create a pipeline.
    ///
    /// # Panics
    /// Panics if `cache_capacity == 0`.
    pub fn new(cache_capacity: usize, default_max_tokens: u32) -> Self {
        Self {
            cache: Mutex::new(ResultCache::new(cache_capacity)),
            matcher: FastPathMatcher::new(),
            default_max_tokens,
        }
    }

    /// Current cache counters.
    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    /// Run one extraction.
    pub fn run(&self, backend: &dyn VisionBackend, job: &ImageJob<'_>) -> Result<ExtractResponse> {
        let hash = ContentHash::of(job.bytes);
        let short = hash.short();

        let cached = self.lock().get(&hash).cloned();
        if let Some(hit) = cached {
            info!("CACHE HIT [{}] model bypassed", short);
            return Ok(ExtractResponse::new(
                Some(hit.receipt),
                hit.raw_text,
                hit.stats,
                CacheStatus::Hit,
                &hash,
            ));
        }

        let prompt = job
            .prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_EXTRACTION_PROMPT);
        let max_tokens = job.max_tokens.unwrap_or(self.default_max_tokens);

        let generation = {
            // Removed when this scope ends, whether generation succeeds or not.
            let image = materialize(job.bytes, job.mime_type)?;
            debug!("Materialized [{}] at {}", short, image.path().display());
            backend
                .generate(image.path(), prompt, max_tokens)
                .inspect_err(|e| warn!("Generation failed [{}]: {}", short, e))?
        };

        let mut extraction = parse_response(&generation.text);
        if let Some(receipt) = extraction.as_mut() {
            if self.matcher.enrich(receipt).is_some() {
                self.lock().record_fast_path();
            }
        }

        if let Some(receipt) = &extraction {
            let entry = CachedExtraction {
                receipt: receipt.clone(),
                raw_text: generation.text.clone(),
                stats: generation.stats.clone(),
            };
            let mut cache = self.lock();
            cache.put(hash, entry);
            info!(
                "CACHE STORE [{}] {}/{}",
                short,
                cache.len(),
                cache.capacity()
            );
        } else {
            info!("No extraction parsed [{}], not cached", short);
        }

        Ok(ExtractResponse::new(
            extraction,
            generation.text,
            generation.stats,
            CacheStatus::Miss,
            &hash,
        ))
    }

    fn lock(&self) -> MutexGuard<'_, ResultCache<CachedExtraction>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write the image to a temporary file the backend can open by path.
fn materialize(bytes: &[u8], mime_type: &str) -> std::io::Result<NamedTempFile> {
    let suffix = format!(".{}", image_extension(mime_type, bytes));
    let mut file = tempfile::Builder::new()
        .prefix("recibo-")
        .suffix(&suffix)
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

/// File extension for an image: from `image/<subtype>` when usable, else
/// sniffed from the bytes, else `bin`.
fn image_extension(mime_type: &str, bytes: &[u8]) -> String {
    let mime = mime_type.trim().to_ascii_lowercase();
    if let Some(subtype) = mime.strip_prefix("image/") {
        let subtype = subtype.split(';').next().unwrap_or_default().trim();
        let subtype = subtype.strip_prefix("x-").unwrap_or(subtype);
        let ext = if subtype == "jpeg" { "jpg" } else { subtype };
        if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return ext.to_string();
        }
    }

    image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
        .to_string()
}
