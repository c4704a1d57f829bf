//! Shared REST state, error mapping, and operational endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use segment_core::SegmentError;
use segment_engine::SegmentStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;
use utoipa::ToSchema;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SegmentStore>,
    pub node_id: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<SegmentStore>, node_id: impl Into<String>) -> Self {
        Self {
            store,
            node_id: node_id.into(),
            start_time: Instant::now(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map an engine error onto a status code and a client-facing message.
/// Internal failures are logged and masked.
pub fn error_response(err: SegmentError) -> ApiError {
    let (status, code) = match &err {
        SegmentError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
        SegmentError::MalformedCondition(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "malformed_condition")
        }
        SegmentError::NotFound(_) => (StatusCode::NOT_FOUND, "segment_not_found"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };

    let message = if err.is_client_error() {
        match err {
            SegmentError::Validation(msg) | SegmentError::MalformedCondition(msg) => msg,
            other => other.to_string(),
        }
    } else {
        error!(error = %err, "Segment request failed");
        metrics::counter!("api.errors").increment(1);
        "Internal processing error".to_string()
    };

    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message,
        }),
    )
}

/// GET /health: Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        segments: state.store.len(),
    })
}

/// GET /ready: Readiness probe.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Operations",
    responses((status = 200, description = "Ready to accept traffic"))
)]
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live: Liveness probe.
#[utoipa::path(
    get,
    path = "/live",
    tag = "Operations",
    responses((status = 200, description = "Process is alive"))
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub segments: usize,
}
