//! Unsubscribe handling: a contact-wide opt-out across every sequence.

use tracing::{info, warn};

use drip_core::types::EnrollmentStatus;
use drip_core::DripResult;

use crate::engine::SequenceEngine;
use crate::state_machine;

/// Result of a token-guarded opt-out request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    /// Email or token absent.
    MissingInput,
    /// Token did not verify. Nothing was looked up.
    InvalidToken,
    /// This many active enrollments were closed.
    Removed(usize),
    /// Valid link, but nothing was active.
    AlreadyRemoved,
}

impl SequenceEngine {
    /// Move every active enrollment of `email` to unsubscribed, in every
    /// sequence. Paused and terminal enrollments are left alone.
    pub async fn unsubscribe(&self, email: &str) -> DripResult<usize> {
        let enrollments = self.store.list_enrollments_by_email(email).await?;

        let mut count = 0;
        for mut enrollment in enrollments {
            if enrollment.status != EnrollmentStatus::Active {
                continue;
            }
            if state_machine::transition(&mut enrollment, EnrollmentStatus::Unsubscribed).is_ok() {
                self.store.update_enrollment(&enrollment).await?;
                count += 1;
            }
        }

        if count > 0 {
            info!(count, "Contact unsubscribed from sequences");
            metrics::counter!("drip.unsubscribes").increment(1);
            self.log_action(
                "sequence_unsubscribed",
                "contact",
                email,
                format!("Paused {count} enrollments"),
            );
        }
        Ok(count)
    }

    /// Public opt-out entry point. No store access happens unless the token
    /// verifies, so the outcome never reveals whether the email is known.
    pub async fn unsubscribe_with_token(
        &self,
        email: &str,
        token: &str,
    ) -> DripResult<UnsubscribeOutcome> {
        let email = email.trim();
        let token = token.trim();
        if email.is_empty() || token.is_empty() {
            return Ok(UnsubscribeOutcome::MissingInput);
        }
        if !self.tokens.verify(email, token) {
            warn!("Unsubscribe token failed verification");
            return Ok(UnsubscribeOutcome::InvalidToken);
        }

        Ok(match self.unsubscribe(email).await? {
            0 => UnsubscribeOutcome::AlreadyRemoved,
            n => UnsubscribeOutcome::Removed(n),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{data, Harness};
    use drip_store::EngineStore;

    #[tokio::test]
    async fn test_unsubscribe_breadth() {
        let h = Harness::new();
        let a = h.engine.enroll("a@x.com", "", "drip_v1", "", data()).await.unwrap().unwrap();
        let b = h.engine.enroll("A@X.com", "", "other_v1", "", data()).await.unwrap().unwrap();
        let mut c = h.engine.enroll("a@x.com", "", "solo_v1", "", data()).await.unwrap().unwrap();
        c.mark_completed(h.clock_now());
        h.store.update_enrollment(&c).await.unwrap();
        let other = h.engine.enroll("z@x.com", "", "drip_v1", "", data()).await.unwrap().unwrap();

        assert_eq!(h.engine.unsubscribe("a@X.COM").await.unwrap(), 2);

        for id in [a.id, b.id] {
            let e = h.store.get_enrollment(id).await.unwrap().unwrap();
            assert_eq!(e.status, EnrollmentStatus::Unsubscribed);
            assert!(e.next_send_at.is_none());
        }
        let c = h.store.get_enrollment(c.id).await.unwrap().unwrap();
        assert_eq!(c.status, EnrollmentStatus::Completed);
        let other = h.store.get_enrollment(other.id).await.unwrap().unwrap();
        assert_eq!(other.status, EnrollmentStatus::Active);

        let entry = &h.audit.entries()[h.audit.count() - 1];
        assert_eq!(entry.action, "sequence_unsubscribed");
        assert_eq!(entry.details, "Paused 2 enrollments");
    }

    #[tokio::test]
    async fn test_unsubscribe_nothing_active() {
        let h = Harness::new();
        assert_eq!(h.engine.unsubscribe("nobody@x.com").await.unwrap(), 0);
        assert_eq!(h.audit.count_action("sequence_unsubscribed"), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_leaves_paused() {
        let h = Harness::new();
        let e = h.engine.enroll("a@x.com", "", "drip_v1", "", data()).await.unwrap().unwrap();
        h.engine.pause_enrollment(e.id).await.unwrap();
        assert_eq!(h.engine.unsubscribe("a@x.com").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_token_guarded_unsubscribe() {
        let h = Harness::new();
        h.engine.enroll("a@x.com", "", "drip_v1", "", data()).await.unwrap();
        let token = h.engine.tokens().generate("a@x.com");

        assert_eq!(
            h.engine.unsubscribe_with_token("", &token).await.unwrap(),
            UnsubscribeOutcome::MissingInput
        );
        assert_eq!(
            h.engine.unsubscribe_with_token("a@x.com", "").await.unwrap(),
            UnsubscribeOutcome::MissingInput
        );
        assert_eq!(
            h.engine.unsubscribe_with_token("a@x.com", "0123456789abcdef0123456789abcdef").await.unwrap(),
            UnsubscribeOutcome::InvalidToken
        );
        assert_eq!(h.store.all_enrollments()[0].status, EnrollmentStatus::Active);

        assert_eq!(
            h.engine.unsubscribe_with_token("A@x.com", &token).await.unwrap(),
            UnsubscribeOutcome::Removed(1)
        );
        assert_eq!(
            h.engine.unsubscribe_with_token("a@x.com", &token).await.unwrap(),
            UnsubscribeOutcome::AlreadyRemoved
        );
    }
}
