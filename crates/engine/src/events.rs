//! Event recorder: applies provider engagement notifications to sends.

use tracing::{debug, info};

use drip_core::types::{EngagementEvent, EnrollmentStatus, SendStatus};
use drip_core::DripResult;

use crate::engine::SequenceEngine;
use crate::state_machine;

impl SequenceEngine {
    /// Apply one notification. Returns `true` only if something changed.
    ///
    /// Opens and clicks are write-once. A bounce always marks the send and
    /// pauses the owning enrollment if it is still active.
    pub async fn record_event(&self, message_id: &str, event: EngagementEvent) -> DripResult<bool> {
        if message_id.trim().is_empty() {
            return Ok(false);
        }
        let Some(mut send) = self.store.get_send_by_message_id(message_id).await? else {
            debug!(message_id, %event, "Event for unknown message ignored");
            return Ok(false);
        };

        let now = self.clock.now();
        match event {
            EngagementEvent::Opened => {
                if send.opened_at.is_some() {
                    return Ok(false);
                }
                send.opened_at = Some(now);
                send.status = SendStatus::Opened;
            }
            EngagementEvent::Clicked => {
                if send.clicked_at.is_some() {
                    return Ok(false);
                }
                send.clicked_at = Some(now);
                send.status = SendStatus::Clicked;
            }
            EngagementEvent::Bounced => {
                send.status = SendStatus::Bounced;
            }
        }
        self.store.update_send(&send).await?;

        if event == EngagementEvent::Bounced {
            if let Some(mut enrollment) = self.store.get_enrollment(send.enrollment_id).await? {
                if enrollment.status == EnrollmentStatus::Active
                    && state_machine::transition(&mut enrollment, EnrollmentStatus::Paused).is_ok()
                {
                    self.store.update_enrollment(&enrollment).await?;
                    info!(
                        enrollment_id = %enrollment.id,
                        message_id,
                        "Enrollment paused after bounce"
                    );
                    self.log_action(
                        "sequence_paused",
                        "enrollment",
                        enrollment.id.to_string(),
                        format!("Bounce on {message_id}"),
                    );
                }
            }
        }

        metrics::counter!("drip.events.recorded", "event" => event.to_string()).increment(1);
        Ok(true)
    }
}
