#![warn(clippy::unwrap_used)]

//! Sequence engine: enrollment, scheduling, dispatch and engagement
//! tracking for multi-step, multi-day email sequences.

pub mod dispatcher;
pub mod engine;
pub mod enrollment;
pub mod events;
pub mod sender;
pub mod state_machine;
pub mod stats;
pub mod token;
pub mod unsubscribe;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod testing;

pub use engine::{LinkSettings, SequenceEngine};
pub use sender::{SendFailure, SendOutcome};
pub use token::UnsubscribeTokens;
pub use unsubscribe::UnsubscribeOutcome;
