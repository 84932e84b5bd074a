//! HTTP server for the model service.
//!
//! # API Endpoints
//!
//! | Method | Path          | Description                                   |
//! |--------|---------------|-----------------------------------------------|
//! | GET    | `/health`     | Health check                                  |
//! | POST   | `/ai-command` | Instruction + table context to a snippet      |
//! | GET    | `/api/logs`   | SSE stream for real-time logs                 |

use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, log_success, LOG_BROADCASTER};
use super::types::{error_response, success_response, HealthResponse, ModelRequest, ModelResponse};
use crate::ai::{CodeGenerator, Provider};
use crate::error::ServerResult;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub generator: Arc<CodeGenerator>,
}

/// The service routes with permissive CORS.
pub fn router(generator: CodeGenerator) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let state = AppState {
        generator: Arc::new(generator),
    };

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/ai-command", post(ai_command))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(port: u16, generator: CodeGenerator) -> ServerResult<()> {
    let app = router(generator);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    log::info!("Sheetsmith model service running on http://localhost:{}", port);
    log::info!("  POST /ai-command - generate a snippet");
    log::info!("  GET  /api/logs   - SSE log stream");
    log::info!("  GET  /health     - health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let providers = [Provider::OpenAi, Provider::Gemini, Provider::Groq, Provider::Anthropic]
        .into_iter()
        .filter(|p| state.generator.has_key(*p))
        .map(|p| p.label().to_lowercase())
        .collect();

    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "Backend is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        providers,
    })
}

/// `POST /ai-command`. Malformed bodies are reported as `500 {"status": "error"}`.
pub async fn ai_command(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<ModelResponse>) {
    let request: ModelRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            log_error(format!("Rejected /ai-command body: {}", e));
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(error_response(format!("Invalid request body: {}", e))),
            );
        }
    };

    let preview: String = request.instruction.chars().take(50).collect();
    log_info(format!(
        "Received request - API: {}, Instruction: {}",
        request.api_provider, preview
    ));

    let code = state
        .generator
        .generate(&request.context, &request.instruction, &request.api_provider)
        .await;
    log_success(format!("Generated: {}", code));

    (StatusCode::OK, Json(success_response(code, &request.api_provider)))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKeys;

    fn state() -> AppState {
        AppState {
            generator: Arc::new(CodeGenerator::new(ProviderKeys::default())),
        }
    }

    #[tokio::test]
    async fn test_ai_command_defaults_to_openai() {
        let body = Bytes::from(r#"{"context": "a | b", "instruction": "drop b"}"#);
        let (status, Json(reply)) = ai_command(State(state()), body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            reply,
            ModelResponse::Success {
                code: "# OpenAI API key not configured".into(),
                api_used: Some("openai".into())
            }
        );
    }

    #[tokio::test]
    async fn test_ai_command_empty_instruction() {
        let body = Bytes::from(r#"{"context": "", "instruction": "", "api_provider": "groq"}"#);
        let (_, Json(reply)) = ai_command(State(state()), body).await;
        assert!(matches!(reply, ModelResponse::Success { code, .. } if code == "# No instruction provided"));
    }

    #[tokio::test]
    async fn test_ai_command_malformed_body() {
        let (status, Json(reply)) = ai_command(State(state()), Bytes::from("not json")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(reply, ModelResponse::Error { .. }));
    }

    #[tokio::test]
    async fn test_health_lists_configured_providers() {
        let keys = ProviderKeys {
            groq: Some("gsk".into()),
            ..ProviderKeys::default()
        };
        let state = AppState {
            generator: Arc::new(CodeGenerator::new(keys)),
        };
        let Json(health) = health(State(state)).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.providers, vec!["groq"]);
    }
}
