//! Aggregate enrollment and engagement numbers for one sequence, and its
//! enrollment listing.

use drip_core::types::{rate_percent, Enrollment, EnrollmentStatus, SequenceStats};
use drip_core::DripResult;

use crate::engine::SequenceEngine;

impl SequenceEngine {
    /// The sequence's enrollments, most recently enrolled first, at most `limit`.
    pub async fn sequence_enrollments(
        &self,
        sequence_id: &str,
        limit: usize,
    ) -> DripResult<Vec<Enrollment>> {
        let mut enrollments = self.store.list_enrollments_by_sequence(sequence_id).await?;
        enrollments.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));
        enrollments.truncate(limit);
        Ok(enrollments)
    }

    /// Totals by status plus per-variant send, open and click counts.
    /// Rates are percentages with one decimal.
    pub async fn sequence_stats(&self, sequence_id: &str) -> DripResult<SequenceStats> {
        let enrollments = self.store.list_enrollments_by_sequence(sequence_id).await?;
        let mut stats = SequenceStats {
            sequence_id: sequence_id.to_string(),
            ..Default::default()
        };

        for enrollment in &enrollments {
            stats.total += 1;
            let variant = stats.variants.entry(enrollment.variant.clone()).or_default();
            variant.total += 1;
            match enrollment.status {
                EnrollmentStatus::Active => {
                    stats.active += 1;
                    variant.active += 1;
                }
                EnrollmentStatus::Completed => {
                    stats.completed += 1;
                    variant.completed += 1;
                }
                EnrollmentStatus::Paused => stats.paused += 1,
                EnrollmentStatus::Unsubscribed => stats.unsubscribed += 1,
            }

            for send in self.store.list_sends_for_enrollment(enrollment.id).await? {
                variant.sends += 1;
                if send.opened_at.is_some() {
                    variant.opens += 1;
                }
                if send.clicked_at.is_some() {
                    variant.clicks += 1;
                }
            }
        }

        for variant in stats.variants.values_mut() {
            variant.open_rate = rate_percent(variant.opens, variant.sends);
            variant.click_rate = rate_percent(variant.clicks, variant.sends);
        }
        stats.completion_rate = rate_percent(stats.completed, stats.total);
        Ok(stats)
    }
}
