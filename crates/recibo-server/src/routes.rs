//! HTTP surface: `GET /health` and `POST /extract`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use recibo_core::models::config::ServerConfig;
use recibo_core::{ExtractRequest, ExtractResponse, ExtractionService, HealthReport, ReciboError};

type SharedService = Arc<ExtractionService>;

/// Build the application router.
pub fn router(service: SharedService, server: &ServerConfig) -> anyhow::Result<Router> {
    let origins = server
        .cors_origins
        .iter()
        .map(|o| HeaderValue::from_str(o))
        .collect::<Result<Vec<_>, _>>()?;

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Ok(Router::new()
        .route("/health", get(health))
        .route("/extract", post(extract))
        .with_state(service)
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

/// Handler for `GET /health`.
async fn health(State(service): State<SharedService>) -> Json<HealthReport> {
    Json(service.health())
}

/// Handler for `POST /extract`.
async fn extract(
    State(service): State<SharedService>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let response = tokio::task::spawn_blocking(move || service.extract(&request))
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;

    Ok(Json(response))
}

/// Error body in the `{"detail": ...}` shape callers expect.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<ReciboError> for ApiError {
    fn from(err: ReciboError) -> Self {
        let status = match &err {
            ReciboError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ReciboError::ServiceNotReady => StatusCode::SERVICE_UNAVAILABLE,
            ReciboError::ModelLoad(_)
            | ReciboError::Generation(_)
            | ReciboError::Io(_)
            | ReciboError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if err.is_client_error() {
            debug!("Rejected request: {}", err);
        } else if status == StatusCode::SERVICE_UNAVAILABLE {
            warn!("Extraction requested before the model is loaded");
        } else {
            error!("Extraction failed: {}", err);
        }

        let detail = match err {
            ReciboError::InvalidInput(msg) => msg,
            ReciboError::ServiceNotReady => "Model not loaded".to_string(),
            other => other.to_string(),
        };
        Self::new(status, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use pretty_assertions::assert_eq;
    use recibo_core::{Generation, GenerationStats, InferenceError, ReciboConfig, VisionBackend};
    use serde_json::Value;
    use tower::ServiceExt;

    struct EchoBackend;

    impl VisionBackend for EchoBackend {
        fn generate(
            &self,
            _: &Path,
            prompt: &str,
            _: u32,
        ) -> Result<Generation, InferenceError> {
            let text = if prompt == "garbage" {
                "no json here".to_string()
            } else {
                "```json\n{\"merchant\": \"Mercadona SA\", \"total\": \"8,20\"}\n```".to_string()
            };
            Ok(Generation {
                text,
                stats: GenerationStats::new(2.0, 12.0, 4.0),
            })
        }

        fn model_id(&self) -> &str {
            "echo"
        }
    }

    fn app(ready: bool) -> Router {
        let config = ReciboConfig::default();
        let service = Arc::new(ExtractionService::new(&config).unwrap());
        if ready {
            service.install(Box::new(EchoBackend), Duration::from_secs(3));
        }
        router(service, &config.server).unwrap()
    }

    fn post_extract(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/extract")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_before_load() {
        let app = app(false);
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "ocr-only");
        assert_eq!(body["ready"], false);
        assert_eq!(body["cache"]["max_size"], 256);
    }

    #[tokio::test]
    async fn test_extract_not_ready() {
        let app = app(false);
        let request = post_extract(json!({ "image": STANDARD.encode(b"img") }));
        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["detail"], "Model not loaded");
    }

    #[tokio::test]
    async fn test_extract_invalid_base64() {
        let app = app(true);
        let (status, body) = send(&app, post_extract(json!({ "image": "%%%" }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("base64"));
    }

    #[tokio::test]
    async fn test_extract_then_hit() {
        let app = app(true);
        let body = json!({ "image": STANDARD.encode(b"receipt bytes"), "mime_type": "image/jpeg" });

        let (status, first) = send(&app, post_extract(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["status"], "ok");
        assert_eq!(first["cache"], "miss");
        assert_eq!(first["extraction"]["merchant"], "Mercadona");
        assert_eq!(first["extraction"]["total"], 8.2);
        assert_eq!(first["extraction"]["category"], "Supermercado");
        assert_eq!(first["stats"]["generation_time_s"], 2.0);
        assert_eq!(first["content_hash"].as_str().unwrap().len(), 16);

        let (_, second) = send(&app, post_extract(body)).await;
        assert_eq!(second["cache"], "hit");
        assert_eq!(second["extraction"], first["extraction"]);
        assert_eq!(second["raw_text"], first["raw_text"]);

        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (_, health) = send(&app, request).await;
        assert_eq!(health["cache"]["hits"], 1);
        assert_eq!(health["cache"]["misses"], 1);
        assert_eq!(health["cache"]["fast_path_hits"], 1);
        assert_eq!(health["cache"]["hit_rate"], 0.5);
    }

    #[tokio::test]
    async fn test_unparseable_output_still_succeeds() {
        let app = app(true);
        let body = json!({ "image": STANDARD.encode(b"blurry"), "prompt": "garbage" });
        let (status, response) = send(&app, post_extract(body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["extraction"], Value::Null);
        assert_eq!(response["raw_text"], "no json here");
    }

    #[test]
    fn test_invalid_cors_origin() {
        let config = ReciboConfig::default();
        let service = Arc::new(ExtractionService::new(&config).unwrap());
        let mut server = config.server.clone();
        server.cors_origins = vec!["bad\norigin".to_string()];

        assert!(router(service, &server).is_err());
    }
}
