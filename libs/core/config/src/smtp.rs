use crate::{ConfigError, FromEnv, env_flag, env_or_default, env_parse_or, env_required};
use std::fmt;

/// SMTP relay credentials and the single sender identity used for every
/// outbound invitation.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
    pub from_name: String,
    /// Implicit TLS relay when true, plaintext (Mailpit/MailHog) when false.
    pub use_tls: bool,
}

impl SmtpConfig {
    pub fn new(host: impl Into<String>, port: u16, from_email: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            from_email: from_email.into(),
            from_name: "Event Mate".to_string(),
            use_tls: true,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_from_name(mut self, from_name: impl Into<String>) -> Self {
        self.from_name = from_name.into();
        self
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Local development relay (Mailpit on localhost:1025, no auth, no TLS).
    pub fn mailpit() -> Self {
        Self::new("localhost", 1025, "noreply@localhost").with_tls(false)
    }

    /// `"Name <address>"`, ready to parse into a mailbox.
    pub fn sender(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }
}

// Keep the password out of logs.
impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

impl FromEnv for SmtpConfig {
    /// - `SMTP_HOST` (required)
    /// - `SMTP_PORT` (default 465)
    /// - `SMTP_USERNAME` / `SMTP_PASSWORD` (optional)
    /// - `SMTP_FROM_EMAIL` (required), `SMTP_FROM_NAME` (default "Event Mate")
    /// - `SMTP_USE_TLS` (default true)
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_required("SMTP_HOST")?,
            port: env_parse_or("SMTP_PORT", 465)?,
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            from_email: env_required("SMTP_FROM_EMAIL")?,
            from_name: env_or_default("SMTP_FROM_NAME", "Event Mate"),
            use_tls: env_flag("SMTP_USE_TLS", true),
        })
    }
}
