//! Enrollment manager: creates enrollments with deduplication and weighted
//! variant assignment, and handles operator pause/resume.

use std::collections::BTreeMap;

use chrono::Duration;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use drip_core::catalog::Variant;
use drip_core::types::{Enrollment, EnrollmentStatus, SourceData};
use drip_core::DripResult;

use crate::engine::SequenceEngine;
use crate::state_machine;

/// Weighted random draw over the variants. `None` if no weight is positive.
pub fn pick_variant<'a, R: Rng + ?Sized>(
    variants: &'a BTreeMap<String, Variant>,
    rng: &mut R,
) -> Option<&'a Variant> {
    let candidates: Vec<&Variant> = variants.values().collect();
    let dist = WeightedIndex::new(candidates.iter().map(|v| v.weight)).ok()?;
    Some(candidates[dist.sample(rng)])
}

impl SequenceEngine {
    /// Enroll a contact in a sequence.
    ///
    /// Returns `Ok(None)` when the sequence is unknown or inactive, or when the
    /// contact already holds a non-terminal enrollment in it. No message is
    /// sent here; the first step goes out on the next due-batch pass.
    pub async fn enroll(
        &self,
        email: &str,
        name: &str,
        sequence_id: &str,
        source: &str,
        source_data: SourceData,
    ) -> DripResult<Option<Enrollment>> {
        let Some(sequence) = self.catalog.get(sequence_id) else {
            debug!(sequence_id, "Enroll skipped: unknown sequence");
            return Ok(None);
        };
        if !sequence.active {
            debug!(sequence_id, "Enroll skipped: sequence inactive");
            return Ok(None);
        }

        let _guard = self.enroll_lock.lock().await;

        if self
            .store
            .find_open_enrollment(sequence_id, email)
            .await?
            .is_some()
        {
            debug!(sequence_id, email, "Enroll skipped: already enrolled");
            return Ok(None);
        }

        let picked = {
            let mut rng = self.rng.lock();
            pick_variant(&sequence.variants, &mut *rng)
        };
        let Some(variant) = picked else {
            error!(sequence_id, "Sequence has no selectable variant");
            return Ok(None);
        };
        let Some(first_step) = variant.steps.first() else {
            error!(sequence_id, variant = %variant.key, "Variant has no steps");
            return Ok(None);
        };

        let now = self.clock.now();
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            sequence_id: sequence_id.to_string(),
            variant: variant.key.clone(),
            contact_email: email.trim().to_string(),
            contact_name: name.to_string(),
            source: source.to_string(),
            source_data,
            current_step: 0,
            status: EnrollmentStatus::Active,
            enrolled_at: now,
            next_send_at: Some(now + Duration::days(i64::from(first_step.delay_days))),
            completed_at: None,
        };

        self.store.insert_enrollment(&enrollment).await?;

        info!(
            enrollment_id = %enrollment.id,
            sequence_id,
            variant = %enrollment.variant,
            "Contact enrolled"
        );
        metrics::counter!("drip.enrollments.created", "sequence" => sequence_id.to_string())
            .increment(1);
        self.log_action(
            "sequence_enrolled",
            "sequence",
            sequence_id,
            format!(
                "{} enrolled in {} variant {}",
                enrollment.contact_email, sequence.name, enrollment.variant
            ),
        );

        Ok(Some(enrollment))
    }

    /// Enroll a contact in every active sequence listening on `trigger`.
    /// Returns the ids of the sequences actually enrolled.
    pub async fn enroll_for_trigger(
        &self,
        email: &str,
        name: &str,
        trigger: &str,
        source: &str,
        source_data: &SourceData,
    ) -> DripResult<Vec<String>> {
        let mut enrolled = Vec::new();
        for sequence in self.catalog.for_trigger(trigger) {
            if self
                .enroll(email, name, &sequence.id, source, source_data.clone())
                .await?
                .is_some()
            {
                enrolled.push(sequence.id.clone());
            }
        }
        Ok(enrolled)
    }

    /// Pause an active enrollment. `false` if missing or not active.
    pub async fn pause_enrollment(&self, id: Uuid) -> DripResult<bool> {
        let Some(mut enrollment) = self.store.get_enrollment(id).await? else {
            return Ok(false);
        };
        if enrollment.status != EnrollmentStatus::Active {
            return Ok(false);
        }
        if state_machine::transition(&mut enrollment, EnrollmentStatus::Paused).is_err() {
            return Ok(false);
        }

        self.store.update_enrollment(&enrollment).await?;
        info!(enrollment_id = %id, "Enrollment paused");
        self.log_action("sequence_paused", "enrollment", id.to_string(), "");
        Ok(true)
    }

    /// Resume a paused enrollment.
    ///
    /// The next send is scheduled `resume_delay` from now rather than on the
    /// authored cadence. An enrollment already past its last step completes.
    pub async fn resume_enrollment(&self, id: Uuid) -> DripResult<bool> {
        let Some(mut enrollment) = self.store.get_enrollment(id).await? else {
            return Ok(false);
        };
        if enrollment.status != EnrollmentStatus::Paused {
            return Ok(false);
        }

        let Some(variant) = self
            .catalog
            .get(&enrollment.sequence_id)
            .and_then(|s| s.variant(&enrollment.variant))
        else {
            warn!(
                enrollment_id = %id,
                sequence_id = %enrollment.sequence_id,
                variant = %enrollment.variant,
                "Cannot resume: sequence or variant no longer in catalog"
            );
            return Ok(false);
        };

        let now = self.clock.now();
        if enrollment.current_step < variant.steps.len() {
            if state_machine::transition(&mut enrollment, EnrollmentStatus::Active).is_err() {
                return Ok(false);
            }
            enrollment.next_send_at = Some(now + self.resume_delay);
        } else {
            if state_machine::transition(&mut enrollment, EnrollmentStatus::Completed).is_err() {
                return Ok(false);
            }
            enrollment.mark_completed(now);
        }

        self.store.update_enrollment(&enrollment).await?;
        info!(enrollment_id = %id, status = enrollment.status.as_str(), "Enrollment resumed");
        self.log_action("sequence_resumed", "enrollment", id.to_string(), "");
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{data, Harness};
    use drip_core::catalog::Step;
    use drip_store::EngineStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn variants(weights: &[(&str, f64)]) -> BTreeMap<String, Variant> {
        weights
            .iter()
            .map(|(k, w)| {
                (
                    k.to_string(),
                    Variant {
                        key: k.to_string(),
                        name: k.to_string(),
                        weight: *w,
                        steps: vec![Step::new(0, "t", "s")],
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_pick_variant_zero_weight_never_chosen() {
        let vs = variants(&[("A", 100.0), ("B", 0.0)]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            assert_eq!(pick_variant(&vs, &mut rng).unwrap().key, "A");
        }
    }

    #[test]
    fn test_pick_variant_even_split() {
        let vs = variants(&[("A", 50.0), ("B", 50.0)]);
        let mut rng = StdRng::seed_from_u64(42);
        let a = (0..2000)
            .filter(|_| pick_variant(&vs, &mut rng).unwrap().key == "A")
            .count();
        assert!((800..1200).contains(&a), "A picked {a} times");
    }

    #[test]
    fn test_pick_variant_no_positive_weight() {
        let vs = variants(&[("A", 0.0)]);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pick_variant(&vs, &mut rng).is_none());
        assert!(pick_variant(&BTreeMap::new(), &mut rng).is_none());
    }

    #[tokio::test]
    async fn test_enroll_creates_active_enrollment() {
        let h = Harness::new();
        let e = h
            .engine
            .enroll("Rider@Example.com", "Sam Rider", "drip_v1", "exit_intent", data())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(e.status, EnrollmentStatus::Active);
        assert_eq!(e.current_step, 0);
        assert_eq!(e.contact_email, "Rider@Example.com");
        assert!(e.variant == "A" || e.variant == "B");
        assert_eq!(e.next_send_at, Some(h.clock_now()));
        assert_eq!(e.source_data["race_name"], "Unbound 200");
        assert_eq!(h.audit.count_action("sequence_enrolled"), 1);
        assert_eq!(h.transport.count(), 0);
    }

    #[tokio::test]
    async fn test_enroll_first_delay_in_days() {
        let h = Harness::new();
        let e = h
            .engine
            .enroll("a@x.com", "A", "delayed_v1", "", data())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(e.next_send_at, Some(h.clock_now() + Duration::days(2)));
    }

    #[tokio::test]
    async fn test_enroll_dedup_is_case_insensitive() {
        let h = Harness::new();
        assert!(h.engine.enroll("a@x.com", "A", "drip_v1", "", data()).await.unwrap().is_some());
        assert!(h.engine.enroll("A@X.COM", "A", "drip_v1", "", data()).await.unwrap().is_none());
        assert_eq!(h.store.enrollment_count(), 1);
        assert_eq!(h.audit.count_action("sequence_enrolled"), 1);
    }

    #[tokio::test]
    async fn test_enroll_allowed_after_terminal() {
        let h = Harness::new();
        let first = h.engine.enroll("a@x.com", "A", "drip_v1", "", data()).await.unwrap().unwrap();
        h.engine.unsubscribe("a@x.com").await.unwrap();
        let again = h.engine.enroll("a@x.com", "A", "drip_v1", "", data()).await.unwrap();
        assert!(again.is_some());
        assert_ne!(again.unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_enroll_rejects_unknown_and_inactive() {
        let h = Harness::new();
        assert!(h.engine.enroll("a@x.com", "A", "nope_v9", "", data()).await.unwrap().is_none());
        assert!(h.engine.enroll("a@x.com", "A", "inactive_v1", "", data()).await.unwrap().is_none());
        assert_eq!(h.store.enrollment_count(), 0);
        assert_eq!(h.audit.count(), 0);
    }

    #[tokio::test]
    async fn test_enroll_always_picks_positive_weight_variant() {
        let h = Harness::new();
        for i in 0..50 {
            let e = h
                .engine
                .enroll(&format!("r{i}@x.com"), "R", "solo_v1", "", data())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(e.variant, "A");
        }
    }

    #[tokio::test]
    async fn test_enroll_for_trigger() {
        let h = Harness::new();
        let enrolled = h
            .engine
            .enroll_for_trigger("a@x.com", "A", "new_subscriber", "web", &data())
            .await
            .unwrap();
        assert_eq!(enrolled, vec!["drip_v1".to_string()]);

        let again = h
            .engine
            .enroll_for_trigger("a@x.com", "A", "new_subscriber", "web", &data())
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_pause_only_from_active() {
        let h = Harness::new();
        let e = h.engine.enroll("a@x.com", "A", "drip_v1", "", data()).await.unwrap().unwrap();

        assert!(h.engine.pause_enrollment(e.id).await.unwrap());
        assert!(!h.engine.pause_enrollment(e.id).await.unwrap());
        assert!(!h.engine.pause_enrollment(Uuid::new_v4()).await.unwrap());

        let stored = h.store.get_enrollment(e.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EnrollmentStatus::Paused);
        assert_eq!(h.audit.count_action("sequence_paused"), 1);
    }

    #[tokio::test]
    async fn test_resume_schedules_catch_up() {
        let h = Harness::new();
        let e = h.engine.enroll("a@x.com", "A", "drip_v1", "", data()).await.unwrap().unwrap();

        assert!(!h.engine.resume_enrollment(e.id).await.unwrap());
        h.engine.pause_enrollment(e.id).await.unwrap();
        h.advance(Duration::days(3));
        assert!(h.engine.resume_enrollment(e.id).await.unwrap());

        let stored = h.store.get_enrollment(e.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EnrollmentStatus::Active);
        assert_eq!(stored.next_send_at, Some(h.clock_now() + Duration::hours(1)));
        assert_eq!(h.audit.count_action("sequence_resumed"), 1);
    }

    #[tokio::test]
    async fn test_resume_past_last_step_completes() {
        let h = Harness::new();
        let mut e = h.engine.enroll("a@x.com", "A", "drip_v1", "", data()).await.unwrap().unwrap();
        e.status = EnrollmentStatus::Paused;
        e.current_step = 3;
        h.store.update_enrollment(&e).await.unwrap();

        assert!(h.engine.resume_enrollment(e.id).await.unwrap());
        let stored = h.store.get_enrollment(e.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EnrollmentStatus::Completed);
        assert_eq!(stored.completed_at, Some(h.clock_now()));
        assert!(stored.next_send_at.is_none());
    }

    #[tokio::test]
    async fn test_resume_with_missing_variant_fails_softly() {
        let h = Harness::new();
        let mut e = h.engine.enroll("a@x.com", "A", "drip_v1", "", data()).await.unwrap().unwrap();
        e.status = EnrollmentStatus::Paused;
        e.variant = "Z".to_string();
        h.store.update_enrollment(&e).await.unwrap();

        assert!(!h.engine.resume_enrollment(e.id).await.unwrap());
        let stored = h.store.get_enrollment(e.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EnrollmentStatus::Paused);
    }
}
