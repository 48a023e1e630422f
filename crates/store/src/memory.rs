//! In-process store backed by DashMap for lock-free concurrent access.
//! Used for development, tests, and single-node deployments without a database.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use drip_core::types::{normalize_email, Enrollment, SendRecord};
use tracing::debug;
use uuid::Uuid;

use crate::store::{EngineStore, StoreError, StoreResult};

/// DashMap-backed [`EngineStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    enrollments: Arc<DashMap<Uuid, Enrollment>>,
    sends: Arc<DashMap<Uuid, SendRecord>>,
    /// message id -> send id
    message_index: Arc<DashMap<String, Uuid>>,
    fail_writes: Arc<AtomicBool>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("enrollments", &self.enrollments.len())
            .field("sends", &self.sends.len())
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with `Unavailable` (fault injection).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn enrollment_count(&self) -> usize {
        self.enrollments.len()
    }

    pub fn send_count(&self) -> usize {
        self.sends.len()
    }

    pub fn all_enrollments(&self) -> Vec<Enrollment> {
        self.enrollments.iter().map(|e| e.value().clone()).collect()
    }

    pub fn all_sends(&self) -> Vec<SendRecord> {
        self.sends.iter().map(|s| s.value().clone()).collect()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EngineStore for MemoryStore {
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        self.check_writable()?;
        if self.enrollments.contains_key(&enrollment.id) {
            return Err(StoreError::Conflict(enrollment.id.to_string()));
        }
        self.enrollments.insert(enrollment.id, enrollment.clone());
        debug!(enrollment_id = %enrollment.id, "Inserted enrollment");
        Ok(())
    }

    async fn get_enrollment(&self, id: Uuid) -> StoreResult<Option<Enrollment>> {
        Ok(self.enrollments.get(&id).map(|e| e.clone()))
    }

    async fn update_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        self.check_writable()?;
        let mut entry = self
            .enrollments
            .get_mut(&enrollment.id)
            .ok_or_else(|| StoreError::NotFound(enrollment.id.to_string()))?;
        *entry = enrollment.clone();
        Ok(())
    }

    async fn find_open_enrollment(
        &self,
        sequence_id: &str,
        email: &str,
    ) -> StoreResult<Option<Enrollment>> {
        let key = normalize_email(email);
        Ok(self
            .enrollments
            .iter()
            .find(|e| {
                e.sequence_id == sequence_id && !e.status.is_terminal() && e.email_key() == key
            })
            .map(|e| e.value().clone()))
    }

    async fn list_enrollments_by_email(&self, email: &str) -> StoreResult<Vec<Enrollment>> {
        let key = normalize_email(email);
        Ok(self
            .enrollments
            .iter()
            .filter(|e| e.email_key() == key)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn list_enrollments_by_sequence(
        &self,
        sequence_id: &str,
    ) -> StoreResult<Vec<Enrollment>> {
        Ok(self
            .enrollments
            .iter()
            .filter(|e| e.sequence_id == sequence_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Enrollment>> {
        Ok(self
            .enrollments
            .iter()
            .filter(|e| e.is_due(now))
            .map(|e| e.value().clone())
            .collect())
    }

    async fn insert_send(&self, send: &SendRecord) -> StoreResult<()> {
        self.check_writable()?;
        if self.sends.contains_key(&send.id) {
            return Err(StoreError::Conflict(send.id.to_string()));
        }
        if !send.message_id.is_empty() {
            self.message_index.insert(send.message_id.clone(), send.id);
        }
        self.sends.insert(send.id, send.clone());
        Ok(())
    }

    async fn get_send_by_message_id(&self, message_id: &str) -> StoreResult<Option<SendRecord>> {
        if message_id.is_empty() {
            return Ok(None);
        }
        let Some(send_id) = self.message_index.get(message_id).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.sends.get(&send_id).map(|s| s.clone()))
    }

    async fn update_send(&self, send: &SendRecord) -> StoreResult<()> {
        self.check_writable()?;
        let mut entry = self
            .sends
            .get_mut(&send.id)
            .ok_or_else(|| StoreError::NotFound(send.id.to_string()))?;
        *entry = send.clone();
        Ok(())
    }

    async fn list_sends_for_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> StoreResult<Vec<SendRecord>> {
        let mut sends: Vec<SendRecord> = self
            .sends
            .iter()
            .filter(|s| s.enrollment_id == enrollment_id)
            .map(|s| s.value().clone())
            .collect();
        sends.sort_by_key(|s| s.step_index);
        Ok(sends)
    }
}
