//! Batch dispatcher: one pass over every due enrollment, never two at once.

use tracing::{debug, info, warn};

use drip_core::types::DispatchSummary;
use drip_core::DripResult;

use crate::engine::SequenceEngine;

impl SequenceEngine {
    /// Run one due-batch pass.
    ///
    /// Returns `skipped` immediately, without touching the store, if another
    /// pass is still running. A failure on one enrollment is counted and the
    /// pass moves on; only a failure to list due work aborts it.
    pub async fn process_due_sends(&self) -> DripResult<DispatchSummary> {
        let Ok(_guard) = self.dispatch_lock.try_lock() else {
            debug!("Dispatch pass already running, skipping");
            metrics::counter!("drip.dispatch.skipped").increment(1);
            return Ok(DispatchSummary::skipped());
        };

        let due = self.store.list_due(self.clock.now()).await?;
        let mut summary = DispatchSummary {
            processed: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            debug!("No sequence sends due");
            return Ok(summary);
        }

        for enrollment in &due {
            match self.send_next_step(enrollment).await {
                Ok(_) => summary.sent += 1,
                Err(err) => {
                    summary.errors += 1;
                    warn!(
                        enrollment_id = %enrollment.id,
                        sequence_id = %enrollment.sequence_id,
                        step = enrollment.current_step,
                        error = %err,
                        "Sequence send failed"
                    );
                    metrics::counter!("drip.sends.failed").increment(1);
                    self.log_action(
                        "sequence_send_error",
                        "enrollment",
                        enrollment.id.to_string(),
                        format!("Send error on step {}: {err}", enrollment.current_step),
                    );
                }
            }
        }

        info!(
            processed = summary.processed,
            sent = summary.sent,
            errors = summary.errors,
            "Dispatch pass finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{data, Harness, InterruptingTransport, Interruption};
    use chrono::Duration;
    use drip_core::types::EnrollmentStatus;
    use drip_store::EngineStore;

    #[tokio::test]
    async fn test_empty_pass_is_noop() {
        let h = Harness::new();
        let summary = h.engine.process_due_sends().await.unwrap();
        assert_eq!(summary, DispatchSummary::default());
    }

    #[tokio::test]
    async fn test_pass_sends_only_due() {
        let h = Harness::new();
        h.engine.enroll("a@x.com", "", "drip_v1", "", data()).await.unwrap();
        h.engine.enroll("b@x.com", "", "delayed_v1", "", data()).await.unwrap();

        let summary = h.engine.process_due_sends().await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.errors, 0);
        assert!(!summary.skipped);

        // Same instant: the advanced enrollment is no longer due.
        let again = h.engine.process_due_sends().await.unwrap();
        assert_eq!(again.processed, 0);
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let h = Harness::new();
        let e = h.engine.enroll("a@x.com", "", "drip_v1", "", data()).await.unwrap().unwrap();

        let held = h.engine.dispatch_lock.clone();
        let guard = held.lock().await;
        let summary = h.engine.process_due_sends().await.unwrap();
        assert_eq!(summary, DispatchSummary::skipped());
        assert_eq!(h.transport.count(), 0);
        assert_eq!(h.store.get_enrollment(e.id).await.unwrap().unwrap(), e);
        drop(guard);

        let summary = h.engine.process_due_sends().await.unwrap();
        assert_eq!(summary.sent, 1);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_send_once() {
        let h = Harness::new();
        for i in 0..20 {
            h.engine
                .enroll(&format!("r{i}@x.com"), "", "drip_v1", "", data())
                .await
                .unwrap();
        }

        let (a, b) = tokio::join!(h.engine.process_due_sends(), h.engine.process_due_sends());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.sent + b.sent, 20);
        assert_eq!(h.transport.count(), 20);
        assert_eq!(h.store.send_count(), 20);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let h = Harness::new();
        let ok = h.engine.enroll("a@x.com", "", "drip_v1", "", data()).await.unwrap().unwrap();
        let mut orphan = h.engine.enroll("b@x.com", "", "other_v1", "", data()).await.unwrap().unwrap();
        orphan.variant = "Z".to_string();
        h.store.update_enrollment(&orphan).await.unwrap();

        let summary = h.engine.process_due_sends().await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(h.audit.count_action("sequence_send_error"), 1);
        assert_eq!(h.store.get_enrollment(ok.id).await.unwrap().unwrap().current_step, 1);

        // Still due next pass.
        h.advance(Duration::minutes(15));
        let retry = h.engine.process_due_sends().await.unwrap();
        assert_eq!(retry.processed, 1);
        assert_eq!(retry.errors, 1);
    }

    #[tokio::test]
    async fn test_paused_enrollments_are_not_due() {
        let h = Harness::new();
        let e = h.engine.enroll("a@x.com", "", "drip_v1", "", data()).await.unwrap().unwrap();
        h.engine.pause_enrollment(e.id).await.unwrap();

        let summary = h.engine.process_due_sends().await.unwrap();
        assert_eq!(summary.processed, 0);
        let stored = h.store.get_enrollment(e.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EnrollmentStatus::Paused);
    }

    #[tokio::test]
    async fn test_store_write_failure_counts_and_stays_due() {
        let h = Harness::new();
        let e = h.engine.enroll("a@x.com", "", "drip_v1", "", data()).await.unwrap().unwrap();
        h.engine.enroll("b@x.com", "", "other_v1", "", data()).await.unwrap();

        h.store.set_fail_writes(true);
        let summary = h.engine.process_due_sends().await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.errors, summary.processed);
        assert_eq!(summary.sent, 0);
        assert_eq!(h.store.send_count(), 0);
        assert_eq!(h.audit.count_action("sequence_send_error"), 2);
        assert_eq!(h.store.get_enrollment(e.id).await.unwrap().unwrap(), e);

        h.store.set_fail_writes(false);
        let retry = h.engine.process_due_sends().await.unwrap();
        assert_eq!(retry.processed, 2);
        assert_eq!(retry.sent, 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_during_send_is_kept() {
        let h = Harness::new();
        let transport = InterruptingTransport::new(Interruption::Unsubscribe);
        let engine = transport.attach(&h.engine);
        let e = engine.enroll("a@x.com", "", "drip_v1", "", data()).await.unwrap().unwrap();

        let summary = engine.process_due_sends().await.unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(h.store.send_count(), 1);
        let stored = h.store.get_enrollment(e.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EnrollmentStatus::Unsubscribed);
        assert_eq!(stored.next_send_at, None);
        assert_eq!(stored.current_step, 0);

        h.advance(Duration::days(30));
        assert_eq!(engine.process_due_sends().await.unwrap().processed, 0);
    }

    #[tokio::test]
    async fn test_pause_during_send_is_kept_and_step_advances() {
        let h = Harness::new();
        let transport = InterruptingTransport::new(Interruption::Pause);
        let engine = transport.attach(&h.engine);
        let e = engine.enroll("a@x.com", "", "drip_v1", "", data()).await.unwrap().unwrap();

        engine.process_due_sends().await.unwrap();
        let stored = h.store.get_enrollment(e.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EnrollmentStatus::Paused);
        assert_eq!(stored.current_step, 1);

        h.advance(Duration::days(30));
        assert_eq!(engine.process_due_sends().await.unwrap().processed, 0);
    }
}
