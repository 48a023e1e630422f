//! The row-level operations the sequence engine needs from a durable store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drip_core::types::{Enrollment, SendRecord};
use drip_core::DripError;
use thiserror::Error;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for DripError {
    fn from(err: StoreError) -> Self {
        DripError::Store(err.to_string())
    }
}

/// Enrollment and send persistence.
///
/// Email lookups are case-insensitive. Uniqueness of open enrollments per
/// (sequence, email) is the engine's job, not the store's.
#[async_trait]
pub trait EngineStore: Send + Sync {
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()>;

    async fn get_enrollment(&self, id: Uuid) -> StoreResult<Option<Enrollment>>;

    /// Replaces the stored row with the same id.
    async fn update_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()>;

    /// The non-terminal enrollment for this pair, if any.
    async fn find_open_enrollment(
        &self,
        sequence_id: &str,
        email: &str,
    ) -> StoreResult<Option<Enrollment>>;

    async fn list_enrollments_by_email(&self, email: &str) -> StoreResult<Vec<Enrollment>>;

    async fn list_enrollments_by_sequence(&self, sequence_id: &str)
        -> StoreResult<Vec<Enrollment>>;

    /// Active enrollments with `next_send_at <= now`.
    async fn list_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Enrollment>>;

    async fn insert_send(&self, send: &SendRecord) -> StoreResult<()>;

    async fn get_send_by_message_id(&self, message_id: &str) -> StoreResult<Option<SendRecord>>;

    async fn update_send(&self, send: &SendRecord) -> StoreResult<()>;

    async fn list_sends_for_enrollment(&self, enrollment_id: Uuid)
        -> StoreResult<Vec<SendRecord>>;
}
