use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Free-form data captured at enrollment time, used for placeholder substitution.
pub type SourceData = BTreeMap<String, serde_json::Value>;

/// Canonical identity key for an email address: trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Stringify a source-data value for substitution (strings without quotes).
pub fn source_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Lifecycle status of an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Paused,
    Completed,
    Unsubscribed,
}

impl EnrollmentStatus {
    /// Completed and unsubscribed enrollments never send again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Unsubscribed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Unsubscribed => "unsubscribed",
        }
    }
}

/// One contact's progress through one sequence's chosen variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Enrollment {
    pub id: Uuid,
    pub sequence_id: String,
    pub variant: String,
    /// Stored with the caller's casing; compare through [`normalize_email`].
    pub contact_email: String,
    pub contact_name: String,
    pub source: String,
    #[schema(value_type = Object)]
    pub source_data: SourceData,
    pub current_step: usize,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
    pub next_send_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    /// Active and scheduled at or before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == EnrollmentStatus::Active
            && self.next_send_at.map(|at| at <= now).unwrap_or(false)
    }

    pub fn email_key(&self) -> String {
        normalize_email(&self.contact_email)
    }

    /// Terminal transition to completed; clears the schedule.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = EnrollmentStatus::Completed;
        self.completed_at = Some(now);
        self.next_send_at = None;
    }
}

/// Delivery/engagement status of a recorded send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Sent,
    Opened,
    Clicked,
    Bounced,
}

/// A record of one message dispatched for one enrollment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SendRecord {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub step_index: usize,
    pub template: String,
    pub subject: String,
    /// Provider-assigned id; empty when no transport was configured.
    pub message_id: String,
    pub status: SendStatus,
    pub sent_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
}

/// Engagement notification kinds accepted from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EngagementEvent {
    Opened,
    Clicked,
    Bounced,
}

impl FromStr for EngagementEvent {
    type Err = String;

    /// Accepts both bare names and provider-prefixed names (`email.opened`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().strip_prefix("email.").unwrap_or(s.trim());
        match name {
            "opened" => Ok(Self::Opened),
            "clicked" => Ok(Self::Clicked),
            "bounced" => Ok(Self::Bounced),
            other => Err(format!("unsupported event type: {other}")),
        }
    }
}

impl fmt::Display for EngagementEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Opened => "opened",
            Self::Clicked => "clicked",
            Self::Bounced => "bounced",
        };
        f.write_str(name)
    }
}

/// Outcome of one batch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DispatchSummary {
    pub processed: usize,
    pub sent: usize,
    pub errors: usize,
    pub skipped: bool,
}

impl DispatchSummary {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Per-variant engagement statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VariantStats {
    pub total: u64,
    pub active: u64,
    pub completed: u64,
    pub sends: u64,
    pub opens: u64,
    pub clicks: u64,
    pub open_rate: f64,
    pub click_rate: f64,
}

/// Aggregate statistics for one sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SequenceStats {
    pub sequence_id: String,
    pub total: u64,
    pub active: u64,
    pub completed: u64,
    pub paused: u64,
    pub unsubscribed: u64,
    pub completion_rate: f64,
    pub variants: BTreeMap<String, VariantStats>,
}

/// Percentage rounded to one decimal; zero when the denominator is zero.
pub fn rate_percent(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64 * 1000.0).round() / 10.0
}
