//! Service facade: readiness, health reporting and request validation.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::CacheStats;
use crate::error::{ReciboError, Result};
use crate::models::config::{MAX_MAX_TOKENS, MIN_MAX_TOKENS, ReciboConfig};
use crate::pipeline::{ExtractResponse, ExtractionPipeline, ImageJob};
use recibo_inference::VisionBackend;

/// Body of an extraction request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRequest {
    /// Base64-encoded image, optionally as a `data:` URL.
    pub image: String,

    /// Image MIME type.
    #[serde(default = "default_mime_type")]
    pub mime_type: String,

    /// Override for the extraction prompt.
    #[serde(default)]
    pub prompt: Option<String>,

    /// Token budget, within `[64, 4096]`.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_mime_type() -> String {
    "image/png".to_string()
}

impl ExtractRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            mime_type: default_mime_type(),
            prompt: None,
            max_tokens: None,
        }
    }
}

/// Health report served on `/health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub role: String,
    pub model: String,
    pub load_time_s: f64,
    pub ready: bool,
    pub cache: CacheStats,
}

struct LoadedModel {
    backend: Box<dyn VisionBackend>,
    load_time: Duration,
}

/// The extraction service shared by all request handlers.
pub struct ExtractionService {
    model_id: String,
    pipeline: ExtractionPipeline,
    model: OnceLock<LoadedModel>,
}

impl ExtractionService {
    /// Create a service that is not ready until a model is loaded.
    pub fn new(config: &ReciboConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model_id: config.model.model_id.clone(),
            pipeline: ExtractionPipeline::new(
                config.cache.capacity,
                config.model.default_max_tokens,
            ),
            model: OnceLock::new(),
        })
    }

    /// Install a loaded backend. Returns `false` if one was already installed.
    pub fn install(&self, backend: Box<dyn VisionBackend>, load_time: Duration) -> bool {
        self.model.set(LoadedModel { backend, load_time }).is_ok()
    }

    /// Run `loader`, timing it, and install the backend it produces.
    pub fn load_with<F>(&self, loader: F) -> Result<()>
    where
        F: FnOnce() -> recibo_inference::Result<Box<dyn VisionBackend>>,
    {
        info!("Loading {}...", self.model_id);
        let start = Instant::now();
        let backend = loader().map_err(ReciboError::ModelLoad)?;
        let load_time = start.elapsed();

        if self.install(backend, load_time) {
            info!("Model loaded in {:.1}s", load_time.as_secs_f64());
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.model.get().is_some()
    }

    /// Readiness and cache counters. Never fails.
    pub fn health(&self) -> HealthReport {
        let load_time = self
            .model
            .get()
            .map(|m| m.load_time.as_secs_f64())
            .unwrap_or(0.0);

        HealthReport {
            status: "ok".to_string(),
            role: "ocr-only".to_string(),
            model: self.model_id.clone(),
            load_time_s: (load_time * 100.0).round() / 100.0,
            ready: self.is_ready(),
            cache: self.pipeline.stats(),
        }
    }

    /// Validate and run one extraction.
    pub fn extract(&self, request: &ExtractRequest) -> Result<ExtractResponse> {
        let model = self.model.get().ok_or(ReciboError::ServiceNotReady)?;

        if let Some(max_tokens) = request.max_tokens {
            if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&max_tokens) {
                return Err(ReciboError::InvalidInput(format!(
                    "max_tokens must be within [{}, {}], got {}",
                    MIN_MAX_TOKENS, MAX_MAX_TOKENS, max_tokens
                )));
            }
        }

        let bytes = decode_image(&request.image)?;
        let job = ImageJob {
            bytes: &bytes,
            mime_type: &request.mime_type,
            prompt: request.prompt.as_deref(),
            max_tokens: request.max_tokens,
        };

        self.pipeline.run(model.backend.as_ref(), &job)
    }
}

/// Decode base64 image data, accepting a `data:<mime>;base64,` prefix and
/// embedded whitespace.
fn decode_image(encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.trim_start().strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| ReciboError::InvalidInput("malformed data URL".into()))?,
        None => encoded,
    };

    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ReciboError::InvalidInput(format!("Invalid base64 image data: {}", e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::CacheStatus;
    use pretty_assertions::assert_eq;
    use recibo_inference::{Generation, GenerationStats, InferenceError};
    use std::path::Path;

    struct FixedBackend(&'static str);

    impl VisionBackend for FixedBackend {
        fn generate(&self, _: &Path, _: &str, _: u32) -> recibo_inference::Result<Generation> {
            Ok(Generation {
                text: self.0.to_string(),
                stats: GenerationStats::new(0.8, 0.0, 0.0),
            })
        }

        fn model_id(&self) -> &str {
            "fixed"
        }
    }

    fn ready_service(reply: &'static str) -> ExtractionService {
        let service = ExtractionService::new(&ReciboConfig::default()).unwrap();
        assert!(service.install(Box::new(FixedBackend(reply)), Duration::from_millis(1500)));
        service
    }

    fn encoded(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    #[test]
    fn test_not_ready_until_loaded() {
        let service = ExtractionService::new(&ReciboConfig::default()).unwrap();
        let health = service.health();
        assert!(!health.ready);
        assert_eq!(health.load_time_s, 0.0);

        let err = service.extract(&ExtractRequest::new(encoded(b"img"))).unwrap_err();
        assert!(matches!(err, ReciboError::ServiceNotReady));
    }

    #[test]
    fn test_health_report() {
        let service = ready_service("{}");
        assert_eq!(
            service.health(),
            HealthReport {
                status: "ok".to_string(),
                role: "ocr-only".to_string(),
                model: "mlx-community/Qwen3-VL-8B-Instruct-4bit".to_string(),
                load_time_s: 1.5,
                ready: true,
                cache: CacheStats {
                    size: 0,
                    max_size: 256,
                    hits: 0,
                    misses: 0,
                    fast_path_hits: 0,
                    hit_rate: 0.0,
                },
            }
        );
    }

    #[test]
    fn test_invalid_base64() {
        let service = ready_service("{}");
        let err = service.extract(&ExtractRequest::new("not base64!!")).unwrap_err();
        assert!(err.is_client_error());

        let err = service.extract(&ExtractRequest::new("data:image/png;base64")).unwrap_err();
        assert!(matches!(err, ReciboError::InvalidInput(_)));
    }

    #[test]
    fn test_empty_image_reaches_model() {
        let service = ready_service("{\"merchant\": \"Worten\"}");
        let response = service.extract(&ExtractRequest::new("")).unwrap();

        assert_eq!(response.cache, CacheStatus::Miss);
        // SHA-256 of the empty input.
        assert_eq!(response.content_hash, "e3b0c44298fc1c14");
        assert!(response.extraction.is_some());
    }

    #[test]
    fn test_max_tokens_range() {
        let service = ready_service("{}");
        let mut request = ExtractRequest::new(encoded(b"img"));
        request.max_tokens = Some(32);
        assert!(service.extract(&request).unwrap_err().is_client_error());

        request.max_tokens = Some(4096);
        assert!(service.extract(&request).is_ok());
    }

    #[test]
    fn test_data_url_and_whitespace() {
        let service = ready_service("{\"merchant\": \"Worten\"}");
        let plain = service.extract(&ExtractRequest::new(encoded(b"receipt"))).unwrap();

        let wrapped = format!("data:image/png;base64,{}\n", encoded(b"receipt"));
        let again = service.extract(&ExtractRequest::new(wrapped)).unwrap();

        assert_eq!(again.cache, CacheStatus::Hit);
        assert_eq!(again.content_hash, plain.content_hash);
    }

    #[test]
    fn test_health_tracks_traffic() {
        let service = ready_service("{\"merchant\": \"IKEA Loures\"}");
        let request = ExtractRequest::new(encoded(b"receipt"));
        service.extract(&request).unwrap();
        service.extract(&request).unwrap();

        let cache = service.health().cache;
        assert_eq!((cache.size, cache.hits, cache.misses, cache.fast_path_hits), (1, 1, 1, 1));
        assert_eq!(cache.hit_rate, 0.5);
    }

    #[test]
    fn test_load_with_failure_keeps_service_unready() {
        let service = ExtractionService::new(&ReciboConfig::default()).unwrap();
        let result = service.load_with(|| Err(InferenceError::ModelLoad("missing weights".into())));

        assert!(matches!(result, Err(ReciboError::ModelLoad(_))));
        assert!(!service.is_ready());

        service
            .load_with(|| Ok(Box::new(FixedBackend("{}")) as Box<dyn VisionBackend>))
            .unwrap();
        assert!(service.is_ready());
    }

    #[cfg(unix)]
    fn command_loader(
        check: &str,
    ) -> impl FnOnce() -> recibo_inference::Result<Box<dyn VisionBackend>> {
        let spec = recibo_inference::CommandSpec {
            model_id: "test-model".to_string(),
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo '{}'".to_string()],
            load_args: vec!["-c".to_string(), check.to_string()],
        };
        move || {
            recibo_inference::CommandBackend::load(spec)
                .map(|b| Box::new(b) as Box<dyn VisionBackend>)
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_load_check_answers_not_ready() {
        let service = ExtractionService::new(&ReciboConfig::default()).unwrap();
        let result =
            service.load_with(command_loader("echo 'No module named mlx_vlm' >&2; exit 1"));

        assert!(matches!(result, Err(ReciboError::ModelLoad(_))));
        assert!(!service.health().ready);
        let err = service.extract(&ExtractRequest::new(encoded(b"img"))).unwrap_err();
        assert!(matches!(err, ReciboError::ServiceNotReady));
    }

    #[cfg(unix)]
    #[test]
    fn test_passing_load_check_becomes_ready() {
        let service = ExtractionService::new(&ReciboConfig::default()).unwrap();
        service.load_with(command_loader("exit 0")).unwrap();

        assert!(service.health().ready);
        let response = service.extract(&ExtractRequest::new(encoded(b"img"))).unwrap();
        assert_eq!(response.raw_text, "{}");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = ReciboConfig::default();
        config.cache.capacity = 0;
        assert!(ExtractionService::new(&config).is_err());
    }
}
