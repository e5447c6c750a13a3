// HTTP endpoint
// POST /ask answers one question; GET /health reports whether the index is ready


use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::indexer::IndexStatus;
use crate::pipeline::QaService;
use crate::{QaError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Error returned to HTTP clients as `{"detail": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// Every pipeline failure, a blank question included, is a 500 with its message
impl From<QaError> for ApiError {
    #[inline]
    fn from(error: QaError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: error.to_string(),
        }
    }
}

/// A body that is not `{"question": string}` never reaches the pipeline
impl From<JsonRejection> for ApiError {
    #[inline]
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                detail: self.detail,
            }),
        )
            .into_response()
    }
}

#[derive(Clone)]
struct AppState {
    service: Arc<QaService>,
}

/// Routes with CORS open to every origin
#[inline]
pub fn router(service: Arc<QaService>) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/health", get(health))
        .with_state(AppState { service })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ask(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AskRequest>, JsonRejection>,
) -> std::result::Result<Json<AskResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let Json(request) = payload?;
    info!(
        "[{}] Question received ({} chars)",
        request_id,
        request.question.len()
    );

    let started = Instant::now();
    match state.service.ask(&request.question).await {
        Ok(answer) => {
            info!(
                "[{}] Answered from {} chunks in {:?}",
                request_id,
                answer.sources.len(),
                started.elapsed()
            );
            Ok(Json(AskResponse {
                answer: answer.text,
            }))
        }
        Err(e) => {
            error!("[{}] Failed to answer: {}", request_id, e);
            Err(e.into())
        }
    }
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let status = state.service.index().status();
    let label = status.label().to_string();
    match status {
        IndexStatus::Ready { chunks } => (
            StatusCode::OK,
            Json(HealthResponse {
                status: label,
                chunks: Some(chunks),
                detail: None,
            }),
        ),
        IndexStatus::Unavailable { reason } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: label,
                chunks: None,
                detail: Some(reason),
            }),
        ),
        IndexStatus::Pending | IndexStatus::Building => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: label,
                chunks: None,
                detail: Some("index is not loaded yet".to_string()),
            }),
        ),
    }
}

/// Serve on `listener` until `shutdown` resolves
///
/// Index warm-up starts immediately in the background.
#[inline]
pub async fn serve_on<F>(listener: TcpListener, service: Arc<QaService>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    service.index().spawn_warmup();

    let address = listener.local_addr()?;
    info!("Serving POST /ask on http://{}", address);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Bind the configured address and serve until Ctrl-C
#[inline]
pub async fn serve(config: &Config) -> Result<()> {
    let service = Arc::new(QaService::from_config(config)?);
    let listener = TcpListener::bind(config.bind_address()).await?;
    serve_on(listener, service, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
