//! Segment builder REST API: live evaluation, segment CRUD, field catalogue,
//! and subscriber vocabularies.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use segment_engine::fields::{self, FieldDescriptor};
use segment_engine::{EvaluationResult, RuleSet, Segment, SegmentDraft};
use serde::Deserialize;
use std::time::Instant;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::rest::{error_response, ApiError, AppState, ErrorResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct EvaluateRequest {
    pub rules: RuleSet,
}

/// POST /v1/segments/evaluate: Evaluate a draft rule set. Never persists.
#[utoipa::path(
    post,
    path = "/v1/segments/evaluate",
    tag = "Segments",
    request_body = EvaluateRequest,
    responses(
        (status = 200, description = "Match count and sample", body = EvaluationResult),
        (status = 422, description = "Malformed condition", body = ErrorResponse),
    )
)]
pub async fn evaluate_segment(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluationResult>, ApiError> {
    let started = Instant::now();
    let result = state.store.evaluate(&request.rules).map_err(error_response)?;

    metrics::counter!("segments.evaluations").increment(1);
    metrics::histogram!("segments.evaluate.latency_us")
        .record(started.elapsed().as_micros() as f64);
    Ok(Json(result))
}

/// GET /v1/segments: List segments, newest first.
#[utoipa::path(
    get,
    path = "/v1/segments",
    tag = "Segments",
    responses((status = 200, description = "All segments", body = [Segment]))
)]
pub async fn list_segments(State(state): State<AppState>) -> Json<Vec<Segment>> {
    Json(state.store.list())
}

/// GET /v1/segments/{id}: Fetch one segment.
#[utoipa::path(
    get,
    path = "/v1/segments/{id}",
    tag = "Segments",
    params(("id" = Uuid, Path, description = "Segment id")),
    responses(
        (status = 200, description = "Segment", body = Segment),
        (status = 404, description = "Unknown segment"),
    )
)]
pub async fn get_segment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Segment>, StatusCode> {
    state.store.get(id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// POST /v1/segments: Save a draft as a new segment.
#[utoipa::path(
    post,
    path = "/v1/segments",
    tag = "Segments",
    request_body = SegmentDraft,
    responses(
        (status = 201, description = "Segment created with a fresh subscriber count", body = Segment),
        (status = 400, description = "Missing name or no condition with a value", body = ErrorResponse),
        (status = 422, description = "Malformed condition", body = ErrorResponse),
    )
)]
pub async fn create_segment(
    State(state): State<AppState>,
    Json(draft): Json<SegmentDraft>,
) -> Result<(StatusCode, Json<Segment>), ApiError> {
    let segment = state.store.save(draft).map_err(reject)?;
    metrics::counter!("segments.created").increment(1);
    Ok((StatusCode::CREATED, Json(segment)))
}

/// PUT /v1/segments/{id}: Replace a segment's definition and recompute its count.
#[utoipa::path(
    put,
    path = "/v1/segments/{id}",
    tag = "Segments",
    params(("id" = Uuid, Path, description = "Segment id")),
    request_body = SegmentDraft,
    responses(
        (status = 200, description = "Segment updated", body = Segment),
        (status = 400, description = "Missing name or no condition with a value", body = ErrorResponse),
        (status = 404, description = "Unknown segment", body = ErrorResponse),
        (status = 422, description = "Malformed condition", body = ErrorResponse),
    )
)]
pub async fn update_segment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(draft): Json<SegmentDraft>,
) -> Result<Json<Segment>, ApiError> {
    let segment = state.store.update(id, draft).map_err(reject)?;
    metrics::counter!("segments.updated").increment(1);
    Ok(Json(segment))
}

/// POST /v1/segments/{id}/recalculate: Refresh the cached subscriber count.
#[utoipa::path(
    post,
    path = "/v1/segments/{id}/recalculate",
    tag = "Segments",
    params(("id" = Uuid, Path, description = "Segment id")),
    responses(
        (status = 200, description = "Segment with refreshed count", body = Segment),
        (status = 404, description = "Unknown segment", body = ErrorResponse),
    )
)]
pub async fn recalculate_segment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Segment>, ApiError> {
    state
        .store
        .recalculate(id)
        .map(Json)
        .map_err(error_response)
}

/// DELETE /v1/segments/{id}: Remove a segment. Campaign references are left dangling.
#[utoipa::path(
    delete,
    path = "/v1/segments/{id}",
    tag = "Segments",
    params(("id" = Uuid, Path, description = "Segment id")),
    responses(
        (status = 204, description = "Segment deleted"),
        (status = 404, description = "Unknown segment"),
    )
)]
pub async fn delete_segment(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.store.delete(id) {
        metrics::counter!("segments.deleted").increment(1);
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// GET /v1/segments/fields: Field catalogue with legal operators per field.
#[utoipa::path(
    get,
    path = "/v1/segments/fields",
    tag = "Segments",
    responses((status = 200, description = "Segmentable fields", body = [FieldDescriptor]))
)]
pub async fn list_fields() -> Json<Vec<FieldDescriptor>> {
    Json(fields::catalogue())
}

/// GET /v1/subscribers/tags: Distinct tags, for value suggestions.
#[utoipa::path(
    get,
    path = "/v1/subscribers/tags",
    tag = "Subscribers",
    responses((status = 200, description = "Tags in use", body = [String]))
)]
pub async fn subscriber_tags(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.store.subscribers().tags())
}

/// GET /v1/subscribers/sources: Distinct signup sources, for value suggestions.
#[utoipa::path(
    get,
    path = "/v1/subscribers/sources",
    tag = "Subscribers",
    responses((status = 200, description = "Sources in use", body = [String]))
)]
pub async fn subscriber_sources(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.store.subscribers().sources())
}

fn reject(err: segment_core::SegmentError) -> ApiError {
    if err.is_client_error() {
        tracing::warn!(error = %err, "Segment rejected");
        metrics::counter!("api.validation_errors").increment(1);
    }
    error_response(err)
}
