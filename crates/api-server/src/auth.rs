//! Shared-secret bearer checks for operator routes and inbound webhooks.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;

use crate::rest::{AppState, ErrorResponse};

/// `true` when `secret` is empty or the `Authorization` header carries
/// `Bearer <secret>`.
pub fn bearer_matches(headers: &HeaderMap, secret: &str) -> bool {
    if secret.is_empty() {
        return true;
    }
    let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return false;
    };
    token.len() == secret.len() && bool::from(token.as_bytes().ct_eq(secret.as_bytes()))
}

pub(crate) fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "unauthorized".to_string(),
            message: message.to_string(),
        }),
    )
}

/// Axum middleware guarding the operator API with `api.operator_token`.
pub async fn require_operator(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if bearer_matches(req.headers(), &state.operator_token) {
        return next.run(req).await;
    }
    metrics::counter!("drip.api.unauthorized", "surface" => "operator").increment(1);
    unauthorized("Authorization header with operator bearer token required").into_response()
}
