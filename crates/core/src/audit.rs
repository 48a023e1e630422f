//! Audit sink: operational action history.
//!
//! The engine accepts an `Arc<dyn AuditSink>` and writes one entry per
//! enrollment, pause, resume, unsubscribe, and send failure.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A single action-history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: String,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            details: details.into(),
            at: Utc::now(),
        }
    }
}

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    fn log_action(&self, entry: AuditEntry);
}

/// No-op sink for modules that don't keep history.
pub struct NoOpAuditSink;

impl AuditSink for NoOpAuditSink {
    fn log_action(&self, _entry: AuditEntry) {}
}

/// Writes entries as structured tracing events under the `audit` target.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_action(&self, entry: AuditEntry) {
        info!(
            target: "audit",
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            details = %entry.details,
            "Audit entry"
        );
    }
}

/// In-memory sink that captures entries for testing.
#[derive(Default)]
pub struct CaptureAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl CaptureAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn count_action(&self, action: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl AuditSink for CaptureAuditSink {
    fn log_action(&self, entry: AuditEntry) {
        self.entries.lock().push(entry);
    }
}

pub fn noop_audit() -> Arc<dyn AuditSink> {
    Arc::new(NoOpAuditSink)
}

pub fn tracing_audit() -> Arc<dyn AuditSink> {
    Arc::new(TracingAuditSink)
}

pub fn capture_audit() -> Arc<CaptureAuditSink> {
    Arc::new(CaptureAuditSink::new())
}
