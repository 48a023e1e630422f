//! Send processor: renders, submits, and records one step for one due
//! enrollment, then advances or completes it.

use std::collections::HashMap;

use chrono::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use drip_channels::links::{self, UtmParams};
use drip_channels::{OutboundMessage, TemplateError, TransportError};
use drip_core::types::{
    source_value_to_string, Enrollment, EnrollmentStatus, SendRecord, SendStatus, SourceData,
};
use drip_store::StoreError;

use crate::engine::SequenceEngine;

/// What a successful call to [`SequenceEngine::send_next_step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Step `step` was delivered (or recorded, without a transport).
    Sent { step: usize, message_id: String },
    /// The enrollment had no steps left and was closed without sending.
    Completed,
}

/// Per-enrollment failure. The enrollment is left untouched and stays due.
#[derive(Debug, Error)]
pub enum SendFailure {
    #[error("sequence {0} is not in the catalog")]
    UnknownSequence(String),
    #[error("variant {variant} of sequence {sequence} is not in the catalog")]
    UnknownVariant { sequence: String, variant: String },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("send failed: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Replace `{key}` in a subject with source-data values. Unknown keys stay literal.
pub fn render_subject(subject: &str, source_data: &SourceData) -> String {
    source_data.iter().fold(subject.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), &source_value_to_string(value))
    })
}

/// Substitution inputs for a body template. Source-data keys win over the
/// contact fields when both are present.
pub fn body_vars(enrollment: &Enrollment) -> HashMap<String, String> {
    let first_name = enrollment
        .contact_name
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();

    let mut vars = HashMap::from([
        ("contact_name".to_string(), enrollment.contact_name.clone()),
        ("contact_email".to_string(), enrollment.contact_email.clone()),
        ("first_name".to_string(), first_name),
    ]);
    for (key, value) in &enrollment.source_data {
        vars.insert(key.clone(), source_value_to_string(value));
    }
    vars
}

impl SequenceEngine {
    /// Process the current step of one enrollment.
    ///
    /// On any error nothing is persisted and the enrollment remains due, so
    /// the next pass retries it.
    pub async fn send_next_step(&self, enrollment: &Enrollment) -> Result<SendOutcome, SendFailure> {
        let sequence = self
            .catalog
            .get(&enrollment.sequence_id)
            .ok_or_else(|| SendFailure::UnknownSequence(enrollment.sequence_id.clone()))?;
        let variant =
            sequence
                .variant(&enrollment.variant)
                .ok_or_else(|| SendFailure::UnknownVariant {
                    sequence: enrollment.sequence_id.clone(),
                    variant: enrollment.variant.clone(),
                })?;

        let steps = &variant.steps;
        let step_index = enrollment.current_step;
        let now = self.clock.now();

        let Some(step) = steps.get(step_index) else {
            if let Some(mut done) = self.store.get_enrollment(enrollment.id).await? {
                if !done.status.is_terminal() {
                    done.mark_completed(now);
                    self.store.update_enrollment(&done).await?;
                }
            }
            debug!(enrollment_id = %enrollment.id, "Enrollment already exhausted, completed");
            return Ok(SendOutcome::Completed);
        };

        let subject = render_subject(&step.subject, &enrollment.source_data);
        let html = self.renderer.render(&step.template, &body_vars(enrollment))?;
        let html = links::add_utm_params(
            &html,
            &self.links.link_domain,
            &UtmParams {
                source: &self.links.utm_source,
                campaign: &enrollment.sequence_id,
                content: format!("{}_{}", enrollment.variant, step_index),
            },
        );
        let unsubscribe_url = self
            .tokens
            .unsubscribe_url(&self.links.public_url, &enrollment.contact_email);
        let html = links::inject_unsubscribe(&html, &unsubscribe_url);

        let message_id = match &self.transport {
            Some(transport) => {
                transport
                    .send(&OutboundMessage {
                        to: enrollment.contact_email.clone(),
                        subject: subject.clone(),
                        html,
                    })
                    .await?
            }
            None => {
                debug!(enrollment_id = %enrollment.id, "No transport, recording send only");
                String::new()
            }
        };

        self.store
            .insert_send(&SendRecord {
                id: Uuid::new_v4(),
                enrollment_id: enrollment.id,
                step_index,
                template: step.template.clone(),
                subject,
                message_id: message_id.clone(),
                status: SendStatus::Sent,
                sent_at: now,
                opened_at: None,
                clicked_at: None,
            })
            .await?;

        // Advance the stored row, not the snapshot: a pause or unsubscribe
        // may have landed while the message was in flight.
        let status = match self.store.get_enrollment(enrollment.id).await? {
            Some(mut current) if !current.status.is_terminal() => {
                current.current_step = step_index + 1;
                if current.status == EnrollmentStatus::Active {
                    match steps.get(current.current_step) {
                        Some(following) => {
                            let delta =
                                i64::from(following.delay_days) - i64::from(step.delay_days);
                            current.next_send_at = Some(now + Duration::days(delta.max(1)));
                        }
                        None => current.mark_completed(now),
                    }
                }
                self.store.update_enrollment(&current).await?;
                current.status
            }
            Some(current) => {
                debug!(
                    enrollment_id = %enrollment.id,
                    status = current.status.as_str(),
                    "Enrollment closed during send, schedule left as is"
                );
                current.status
            }
            None => {
                warn!(enrollment_id = %enrollment.id, "Enrollment vanished during send");
                enrollment.status
            }
        };

        info!(
            enrollment_id = %enrollment.id,
            sequence_id = %enrollment.sequence_id,
            variant = %enrollment.variant,
            step = step_index,
            status = status.as_str(),
            "Sequence step sent"
        );
        metrics::counter!("drip.sends.sent", "sequence" => enrollment.sequence_id.clone())
            .increment(1);

        Ok(SendOutcome::Sent {
            step: step_index,
            message_id,
        })
    }
}
