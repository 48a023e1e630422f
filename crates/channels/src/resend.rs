//! Resend email transport.
//!
//! Submits messages to the Resend `/emails` API. The HTTP client carries a
//! bounded timeout; a timeout is reported like any other submission failure.

use std::time::Duration;

use async_trait::async_trait;
use drip_core::config::EmailConfig;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::transport::{OutboundMessage, Transport, TransportError};

#[derive(Debug, Deserialize)]
struct ResendResponse {
    #[serde(default)]
    id: String,
}

/// Resend email provider.
pub struct ResendTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl ResendTransport {
    pub fn new(config: &EmailConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        info!(
            from = %config.from_email,
            timeout_ms = config.timeout_ms,
            "Resend transport initialized"
        );

        Ok(Self {
            client,
            endpoint: format!("{}/emails", config.api_base_url.trim_end_matches('/')),
            api_key: config.resend_api_key.clone(),
            from: format!("{} <{}>", config.from_name, config.from_email),
        })
    }

    fn payload(&self, message: &OutboundMessage) -> serde_json::Value {
        serde_json::json!({
            "from": self.from,
            "to": [message.to],
            "subject": message.subject,
            "html": message.html,
        })
    }
}

#[async_trait]
impl Transport for ResendTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<String, TransportError> {
        debug!(to = %message.to, subject = %message.subject, "Sending email via Resend");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(message))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), to = %message.to, "Resend rejected message");
            metrics::counter!("resend.rejected").increment(1);
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ResendResponse = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        metrics::counter!("resend.emails_sent").increment(1);
        Ok(parsed.id)
    }
}
