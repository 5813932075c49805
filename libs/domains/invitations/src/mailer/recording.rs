//! In-process transport that records messages instead of sending them.

use super::{MailTransport, OutgoingMail, SentMail};
use crate::error::{MailError, MailResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Mail transport that captures sent messages (development and tests).
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
    verifications: Arc<AtomicUsize>,
    failure: Option<String>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose `verify` and `send` always fail with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn was_sent_to(&self, email: &str) -> bool {
        self.sent.lock().await.iter().any(|m| m.to.as_str() == email)
    }

    /// How many times `verify` has been called.
    pub fn verifications(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn verify(&self) -> MailResult<()> {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(MailError::Transport(message.clone())),
            None => Ok(()),
        }
    }

    async fn send(&self, mail: &OutgoingMail) -> MailResult<SentMail> {
        if let Some(message) = &self.failure {
            return Err(MailError::Transport(message.clone()));
        }

        let mut sent = self.sent.lock().await;
        sent.push(mail.clone());

        Ok(SentMail {
            message_id: format!("recorded-{}", sent.len()),
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmailAddress;

    fn mail(to: &str) -> OutgoingMail {
        OutgoingMail {
            to: EmailAddress::parse(to).unwrap(),
            subject: "Subject".into(),
            html_body: "<p>Body</p>".into(),
            text_body: "Body".into(),
        }
    }

    #[tokio::test]
    async fn test_records_sent_mail() {
        let mailer = RecordingMailer::new();

        let sent = mailer.send(&mail("sam@example.com")).await.unwrap();

        assert_eq!(sent.message_id, "recorded-1");
        assert_eq!(mailer.sent_count().await, 1);
        assert!(mailer.was_sent_to("sam@example.com").await);
    }

    #[tokio::test]
    async fn test_clones_share_the_outbox() {
        let mailer = RecordingMailer::new();
        let handle = mailer.clone();

        mailer.send(&mail("sam@example.com")).await.unwrap();

        assert_eq!(handle.sent_count().await, 1);
    }

    #[tokio::test]
    async fn test_failing_mailer() {
        let mailer = RecordingMailer::failing("relay down");

        assert!(mailer.verify().await.is_err());
        let err = mailer.send(&mail("sam@example.com")).await.unwrap_err();
        assert!(err.to_string().contains("relay down"));
        assert_eq!(mailer.sent_count().await, 0);
        assert_eq!(mailer.verifications(), 1);
    }
}
