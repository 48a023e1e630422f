//! Inbound webhooks: new subscribers from the site's capture forms and
//! engagement events from the email provider.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use drip_core::types::{EngagementEvent, SourceData};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::auth::{bearer_matches, unauthorized};
use crate::rest::{api_error, internal_error, ApiError, AppState, ErrorResponse};

const MAX_NAME_LEN: usize = 200;
const MAX_SOURCE_LEN: usize = 100;
const DEFAULT_TRIGGER: &str = "new_subscriber";

/// Trim, lower-case and sanity-check an address. Deliberately permissive:
/// one `@`, no whitespace, bounded local part and domain.
pub fn validate_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    let valid_part = |part: &str, max: usize| {
        !part.is_empty()
            && part.chars().count() <= max
            && !part.chars().any(|c| c.is_whitespace() || c == '@')
    };
    (valid_part(local, 64) && valid_part(domain, 255)).then_some(email)
}

/// Capture-form source to enrollment trigger.
pub fn trigger_for_source(source: &str) -> &'static str {
    match source {
        "exit_intent" | "race_profile" | "fueling_calculator" => "new_subscriber",
        "prep_kit_gate" => "prep_kit_download",
        "race_quiz" | "quiz_shared" => "quiz_completed",
        _ => DEFAULT_TRIGGER,
    }
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn guard(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Result<(), ApiError> {
    let key = peer
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    if !state.limiter.check(&key) {
        warn!(client = %key, "Webhook rate limit exceeded");
        return Err(api_error(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "Rate limit exceeded",
        ));
    }
    if !bearer_matches(headers, &state.webhook_secret) {
        metrics::counter!("drip.api.unauthorized", "surface" => "webhook").increment(1);
        return Err(unauthorized("Invalid webhook secret"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubscriberRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_source")]
    pub source: String,
    pub race_slug: Option<String>,
    pub race_name: Option<String>,
}

fn default_source() -> String {
    "unknown".to_string()
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubscriberResponse {
    pub status: String,
    pub enrolled: Vec<String>,
}

/// POST /webhooks/subscriber: enroll a newly captured subscriber.
#[utoipa::path(
    post,
    path = "/webhooks/subscriber",
    tag = "Webhooks",
    request_body = SubscriberRequest,
    responses(
        (status = 200, description = "Subscriber processed", body = SubscriberResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse),
        (status = 401, description = "Invalid webhook secret", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
    )
)]
pub async fn handle_subscriber(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<SubscriberRequest>,
) -> Result<Json<SubscriberResponse>, ApiError> {
    guard(&state, &headers, peer)?;

    let email = validate_email(&request.email)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "invalid_email", "Invalid email format"))?;
    let name = truncate(request.name.trim(), MAX_NAME_LEN);
    let source = truncate(&request.source, MAX_SOURCE_LEN);

    let mut source_data = SourceData::new();
    for (key, value) in [("race_slug", request.race_slug), ("race_name", request.race_name)] {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            source_data.insert(key.to_string(), serde_json::Value::String(value));
        }
    }

    let trigger = trigger_for_source(&source);
    let mut enrolled = state
        .engine
        .enroll_for_trigger(&email, &name, trigger, &source, &source_data)
        .await
        .map_err(internal_error)?;
    if trigger != DEFAULT_TRIGGER {
        enrolled.extend(
            state
                .engine
                .enroll_for_trigger(&email, &name, DEFAULT_TRIGGER, &source, &source_data)
                .await
                .map_err(internal_error)?,
        );
    }

    info!(source = %source, trigger, enrolled = enrolled.len(), "Subscriber webhook processed");
    let summary = if enrolled.is_empty() {
        "none (already enrolled)".to_string()
    } else {
        enrolled.join(", ")
    };
    state.engine.log_action(
        "subscriber_received",
        "webhook",
        email.as_str(),
        format!("Source: {source}, enrolled in: {summary}"),
    );

    Ok(Json(SubscriberResponse {
        status: "ok".to_string(),
        enrolled,
    }))
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ResendEventData {
    #[serde(default)]
    pub email_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResendEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub data: ResendEventData,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResendEventResponse {
    /// `recorded`, `not_found`, or `ignored`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ResendEventResponse {
    fn status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            reason: None,
        }
    }

    fn ignored(reason: String) -> Self {
        Self {
            status: "ignored".to_string(),
            reason: Some(reason),
        }
    }
}

/// POST /webhooks/resend: provider delivery notifications.
#[utoipa::path(
    post,
    path = "/webhooks/resend",
    tag = "Webhooks",
    request_body = ResendEvent,
    responses(
        (status = 200, description = "Event recorded, unmatched, or ignored", body = ResendEventResponse),
        (status = 401, description = "Invalid webhook secret", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
    )
)]
pub async fn handle_resend(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(event): Json<ResendEvent>,
) -> Result<Json<ResendEventResponse>, ApiError> {
    guard(&state, &headers, peer)?;

    let message_id = event.data.email_id.trim();
    if message_id.is_empty() {
        return Ok(Json(ResendEventResponse::ignored("no email_id".to_string())));
    }
    let kind = match event.event_type.parse::<EngagementEvent>() {
        Ok(kind) if event.event_type.starts_with("email.") => kind,
        _ => {
            debug!(event_type = %event.event_type, "Unhandled provider event");
            return Ok(Json(ResendEventResponse::ignored(format!(
                "unhandled event: {}",
                event.event_type
            ))));
        }
    };

    let changed = state
        .engine
        .record_event(message_id, kind)
        .await
        .map_err(internal_error)?;
    Ok(Json(ResendEventResponse::status(if changed {
        "recorded"
    } else {
        "not_found"
    })))
}
