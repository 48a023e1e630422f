//! Transport seam: submit one rendered message to one recipient.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use drip_core::DripError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A fully rendered message ready for submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("provider request timed out")]
    Timeout,
    #[error("provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("provider request failed: {0}")]
    Http(String),
    #[error("provider response malformed: {0}")]
    InvalidResponse(String),
}

impl From<TransportError> for DripError {
    fn from(err: TransportError) -> Self {
        DripError::Transport(err.to_string())
    }
}

/// Sends a message and returns the provider-assigned message id.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<String, TransportError>;
}

/// Captures messages in memory and hands out sequential ids (`msg-1`, `msg-2`, ...).
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    counter: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<String, TransportError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().push(message.clone());
        Ok(format!("msg-{n}"))
    }
}

/// Always fails; counts attempts.
#[derive(Default)]
pub struct FailingTransport {
    attempts: AtomicUsize,
}

impl FailingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&self, _message: &OutboundMessage) -> Result<String, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Timeout)
    }
}
