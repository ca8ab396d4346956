//! HTTP routing for Parley Gateway

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use parley_protocol::{ChatResponse, ErrorBody, HealthResponse, ModelInfo};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::chat::ChatOrchestrator;
use crate::error::ChatError;
use crate::metrics;

/// Largest accepted request body. Whole conversations are resent every turn.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(orchestrator: ChatOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Build the main router for the gateway
pub fn build_routes(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);
    Router::new()
        .route("/health", get(health_check).fallback(method_not_allowed))
        .route("/models", get(list_models).fallback(method_not_allowed))
        .route("/chat", post(chat).fallback(method_not_allowed))
        .route("/metrics", get(export_metrics).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(body_limit)
        .with_state(state)
}

/// Routes plus the CORS and tracing layers
pub fn app(state: AppState) -> Router {
    build_routes(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

async fn list_models(State(state): State<AppState>) -> Result<Json<Vec<ModelInfo>>, ChatError> {
    state.orchestrator.list_models().await.map(Json)
}

/// The body is taken raw so malformed JSON maps to our own error shape.
async fn chat(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ChatResponse>, ChatError> {
    let body = body.map_err(|rejection| {
        tracing::debug!(status = %rejection.status(), "Chat body rejected");
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ChatError::InvalidRequest(format!(
                "Request body exceeds {} bytes",
                state.max_body_bytes
            ))
        } else {
            ChatError::InvalidRequest(rejection.body_text())
        }
    })?;
    state.orchestrator.handle_request_body(&body).await.map(Json)
}

async fn export_metrics() -> impl IntoResponse {
    match metrics::export() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Metrics export failed");
            ChatError::Internal(err.to_string()).into_response()
        }
    }
}

async fn method_not_allowed() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorBody::new("Method not allowed")),
    )
}

async fn not_found() -> (StatusCode, Json<ErrorBody>) {
    (StatusCode::NOT_FOUND, Json(ErrorBody::new("Not found")))
}
