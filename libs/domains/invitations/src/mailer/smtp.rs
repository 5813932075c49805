//! SMTP transport using lettre.

use super::{MailTransport, OutgoingMail, SentMail};
use crate::error::{MailError, MailResult};
use async_trait::async_trait;
use core_config::smtp::SmtpConfig;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{debug, error};
use uuid::Uuid;

/// Port that expects STARTTLS rather than implicit TLS.
const SUBMISSION_PORT: u16 = 587;

/// SMTP mail transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    host: String,
    port: u16,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> MailResult<Self> {
        let sender: Mailbox = config.sender().parse()?;
        let transport = Self::build_transport(config)?;

        Ok(Self {
            transport,
            sender,
            host: config.host.clone(),
            port: config.port,
        })
    }

    /// The configured sender identity, `Name <address>`.
    pub fn sender(&self) -> &Mailbox {
        &self.sender
    }

    fn build_transport(config: &SmtpConfig) -> MailResult<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if !config.use_tls {
            // Local capture servers (Mailpit) speak plain SMTP
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        } else if config.port == SUBMISSION_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        };
        let mut builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }

    fn build_message(&self, mail: &OutgoingMail, message_id: &str) -> MailResult<Message> {
        let to: Mailbox = mail.to.as_str().parse()?;

        let message = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(&mail.subject)
            .message_id(Some(message_id.to_string()))
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(mail.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(mail.html_body.clone()),
                    ),
            )?;

        Ok(message)
    }

    fn next_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.sender.email.domain())
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn verify(&self) -> MailResult<()> {
        if self.transport.test_connection().await? {
            Ok(())
        } else {
            Err(MailError::Transport(format!(
                "{}:{} did not accept the connection test",
                self.host, self.port
            )))
        }
    }

    async fn send(&self, mail: &OutgoingMail) -> MailResult<SentMail> {
        debug!(
            to = %mail.to,
            subject = %mail.subject,
            host = %self.host,
            port = self.port,
            "Sending email via SMTP"
        );

        let message_id = self.next_message_id();
        let message = self.build_message(mail, &message_id)?;

        self.transport.send(message).await.map_err(|e| {
            error!(to = %mail.to, error = %e, "SMTP send failed");
            MailError::from(e)
        })?;

        Ok(SentMail { message_id })
    }

    fn name(&self) -> &'static str {
        "SMTP"
    }
}
