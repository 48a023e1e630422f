use drip_core::types::{Enrollment, EnrollmentStatus};
use thiserror::Error;

/// Describes a single valid status change for an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: EnrollmentStatus,
    pub to: EnrollmentStatus,
    pub trigger: &'static str,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid enrollment transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: EnrollmentStatus,
    pub to: EnrollmentStatus,
}

/// Every permitted status change. Terminal statuses have no outgoing edges.
pub const TRANSITIONS: &[StateTransition] = &[
    // Active ->
    StateTransition {
        from: EnrollmentStatus::Active,
        to: EnrollmentStatus::Paused,
        trigger: "pause_or_bounce",
    },
    StateTransition {
        from: EnrollmentStatus::Active,
        to: EnrollmentStatus::Completed,
        trigger: "last_step_sent",
    },
    StateTransition {
        from: EnrollmentStatus::Active,
        to: EnrollmentStatus::Unsubscribed,
        trigger: "unsubscribe",
    },
    // Paused ->
    StateTransition {
        from: EnrollmentStatus::Paused,
        to: EnrollmentStatus::Active,
        trigger: "resume",
    },
    StateTransition {
        from: EnrollmentStatus::Paused,
        to: EnrollmentStatus::Completed,
        trigger: "resume_exhausted",
    },
];

/// Returns `true` if the given transition is allowed.
pub fn can_transition(from: EnrollmentStatus, to: EnrollmentStatus) -> bool {
    TRANSITIONS.iter().any(|t| t.from == from && t.to == to)
}

/// Moves the enrollment to `to`, or leaves it untouched and errors.
/// Keeps `next_send_at` null for terminal statuses.
pub fn transition(enrollment: &mut Enrollment, to: EnrollmentStatus) -> Result<(), InvalidTransition> {
    if !can_transition(enrollment.status, to) {
        return Err(InvalidTransition {
            from: enrollment.status,
            to,
        });
    }
    enrollment.status = to;
    if to.is_terminal() {
        enrollment.next_send_at = None;
    }
    Ok(())
}
