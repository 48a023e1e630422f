//! REST handlers for the operator API and operational endpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use drip_core::catalog::SequenceDefinition;
use drip_core::config::AppConfig;
use drip_core::types::{DispatchSummary, Enrollment, SequenceStats, SourceData};
use drip_core::DripError;
use drip_engine::SequenceEngine;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::rate_limit::RateLimiter;
use crate::webhooks::validate_email;

/// Shared application state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: SequenceEngine,
    pub node_id: String,
    pub start_time: Instant,
    pub operator_token: String,
    pub webhook_secret: String,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(engine: SequenceEngine, config: &AppConfig) -> Self {
        Self {
            engine,
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
            operator_token: config.api.operator_token.clone(),
            webhook_secret: config.webhooks.secret.clone(),
            limiter: Arc::new(RateLimiter::new(config.webhooks.rate_limit_per_minute)),
        }
    }
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

pub(crate) fn internal_error(err: DripError) -> ApiError {
    error!(error = %err, "Request failed");
    metrics::counter!("drip.api.errors").increment(1);
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Internal processing error",
    )
}

/// POST /v1/dispatch: run one due-batch pass now.
#[utoipa::path(
    post,
    path = "/v1/dispatch",
    tag = "Operator",
    responses(
        (status = 200, description = "Pass finished or skipped", body = DispatchSummary),
        (status = 401, description = "Missing or wrong operator token", body = ErrorResponse),
    )
)]
pub async fn handle_dispatch(
    State(state): State<AppState>,
) -> Result<Json<DispatchSummary>, ApiError> {
    let summary = state.engine.process_due_sends().await.map_err(internal_error)?;
    info!(
        processed = summary.processed,
        sent = summary.sent,
        errors = summary.errors,
        skipped = summary.skipped,
        "Manual dispatch"
    );
    Ok(Json(summary))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnrollRequest {
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub sequence_id: String,
    #[serde(default = "default_operator_source")]
    pub source: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub source_data: SourceData,
}

fn default_operator_source() -> String {
    "operator".to_string()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnrollResponse {
    pub enrolled: bool,
    pub enrollment: Option<Enrollment>,
}

/// POST /v1/enrollments: enroll one contact in one sequence.
#[utoipa::path(
    post,
    path = "/v1/enrollments",
    tag = "Operator",
    request_body = EnrollRequest,
    responses(
        (status = 200, description = "Enrolled, or already enrolled / sequence inactive", body = EnrollResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse),
    )
)]
pub async fn handle_enroll(
    State(state): State<AppState>,
    Json(request): Json<EnrollRequest>,
) -> Result<Json<EnrollResponse>, ApiError> {
    let email = validate_email(&request.email).ok_or_else(|| {
        warn!("Operator enrollment rejected: invalid email");
        api_error(StatusCode::BAD_REQUEST, "invalid_email", "Invalid email format")
    })?;

    let enrollment = state
        .engine
        .enroll(
            &email,
            request.name.trim(),
            &request.sequence_id,
            &request.source,
            request.source_data,
        )
        .await
        .map_err(internal_error)?;

    Ok(Json(EnrollResponse {
        enrolled: enrollment.is_some(),
        enrollment,
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnrollmentActionResponse {
    pub enrollment_id: Uuid,
    /// `false` when the enrollment was missing or in the wrong state.
    pub changed: bool,
}

/// POST /v1/enrollments/{id}/pause
#[utoipa::path(
    post,
    path = "/v1/enrollments/{id}/pause",
    tag = "Operator",
    params(("id" = Uuid, Path, description = "Enrollment identifier")),
    responses(
        (status = 200, description = "Pause applied or not applicable", body = EnrollmentActionResponse),
    )
)]
pub async fn handle_pause(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EnrollmentActionResponse>, ApiError> {
    let changed = state.engine.pause_enrollment(id).await.map_err(internal_error)?;
    Ok(Json(EnrollmentActionResponse {
        enrollment_id: id,
        changed,
    }))
}

/// POST /v1/enrollments/{id}/resume
#[utoipa::path(
    post,
    path = "/v1/enrollments/{id}/resume",
    tag = "Operator",
    params(("id" = Uuid, Path, description = "Enrollment identifier")),
    responses(
        (status = 200, description = "Resume applied or not applicable", body = EnrollmentActionResponse),
    )
)]
pub async fn handle_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EnrollmentActionResponse>, ApiError> {
    let changed = state.engine.resume_enrollment(id).await.map_err(internal_error)?;
    Ok(Json(EnrollmentActionResponse {
        enrollment_id: id,
        changed,
    }))
}

/// GET /v1/sequences: the loaded catalog.
#[utoipa::path(
    get,
    path = "/v1/sequences",
    tag = "Operator",
    responses(
        (status = 200, description = "All sequence definitions", body = Vec<SequenceDefinition>),
    )
)]
pub async fn handle_list_sequences(State(state): State<AppState>) -> Json<Vec<SequenceDefinition>> {
    Json(state.engine.catalog().all().cloned().collect())
}

/// Upper bound on rows returned by the enrollment listing.
pub const ENROLLMENT_LIST_LIMIT: usize = 200;

/// GET /v1/sequences/{id}/enrollments: newest enrollments first.
#[utoipa::path(
    get,
    path = "/v1/sequences/{id}/enrollments",
    tag = "Operator",
    params(("id" = String, Path, description = "Sequence identifier")),
    responses(
        (status = 200, description = "Enrollments, most recent first", body = Vec<Enrollment>),
        (status = 404, description = "Unknown sequence", body = ErrorResponse),
    )
)]
pub async fn handle_sequence_enrollments(
    State(state): State<AppState>,
    Path(sequence_id): Path<String>,
) -> Result<Json<Vec<Enrollment>>, ApiError> {
    if state.engine.catalog().get(&sequence_id).is_none() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            "unknown_sequence",
            format!("Sequence {sequence_id} not found"),
        ));
    }
    let enrollments = state
        .engine
        .sequence_enrollments(&sequence_id, ENROLLMENT_LIST_LIMIT)
        .await
        .map_err(internal_error)?;
    Ok(Json(enrollments))
}

/// GET /v1/sequences/{id}/stats
#[utoipa::path(
    get,
    path = "/v1/sequences/{id}/stats",
    tag = "Operator",
    params(("id" = String, Path, description = "Sequence identifier")),
    responses(
        (status = 200, description = "Enrollment and engagement statistics", body = SequenceStats),
        (status = 404, description = "Unknown sequence", body = ErrorResponse),
    )
)]
pub async fn handle_sequence_stats(
    State(state): State<AppState>,
    Path(sequence_id): Path<String>,
) -> Result<Json<SequenceStats>, ApiError> {
    if state.engine.catalog().get(&sequence_id).is_none() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            "unknown_sequence",
            format!("Sequence {sequence_id} not found"),
        ));
    }
    let stats = state
        .engine
        .sequence_stats(&sequence_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(stats))
}

/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        sequences: state.engine.catalog().len(),
    })
}

/// GET /ready. Ready once a catalog with at least one
/// sequence is loaded.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Operations",
    responses(
        (status = 200, description = "Ready"),
        (status = 503, description = "No sequences loaded"),
    )
)]
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.engine.catalog().is_empty() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

/// GET /live
#[utoipa::path(
    get,
    path = "/live",
    tag = "Operations",
    responses((status = 200, description = "Alive"))
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub sequences: usize,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}
