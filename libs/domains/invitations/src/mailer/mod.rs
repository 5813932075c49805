//! Outgoing mail transport.
//!
//! The transport is built once per process, verified at startup and shared
//! by every invocation. It carries the single sender identity used for all
//! invitation mail.

mod recording;
mod smtp;

pub use recording::RecordingMailer;
pub use smtp::SmtpMailer;

use crate::error::MailResult;
use crate::models::EmailAddress;
use async_trait::async_trait;

/// A rendered message ready for the transport. The sender is the
/// transport's configured identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: EmailAddress,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// What the transport reports back after accepting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    /// Message identifier for log correlation.
    pub message_id: String,
}

/// Trait for mail transports.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Check that the transport can reach its server.
    async fn verify(&self) -> MailResult<()>;

    /// Send one message.
    async fn send(&self, mail: &OutgoingMail) -> MailResult<SentMail>;

    /// Transport name for logging.
    fn name(&self) -> &'static str;
}
