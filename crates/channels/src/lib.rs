#![warn(clippy::unwrap_used)]

//! Outbound email plumbing: transport, template rendering, and link rewriting.

pub mod links;
pub mod resend;
pub mod templates;
pub mod transport;

pub use resend::ResendTransport;
pub use templates::{FileTemplateRenderer, InMemoryTemplates, TemplateError, TemplateRenderer};
pub use transport::{OutboundMessage, Transport, TransportError};
