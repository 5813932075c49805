//! Error types for the invitations domain.

use thiserror::Error;

/// Result type for the invitation pipeline.
pub type InvitationResult<T> = Result<T, InvitationError>;

/// Result type for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for mail transport operations.
pub type MailResult<T> = Result<T, MailError>;

/// Everything that can end an invocation early.
#[derive(Debug, Error)]
pub enum InvitationError {
    /// The invitation document carries no usable `email`.
    #[error("No email found in invitation")]
    MissingRecipient,

    /// The `email` value failed the syntactic check.
    #[error("Invalid email format: {0}")]
    InvalidRecipient(String),

    /// No event document exists for the trigger's event id.
    #[error("Event not found: {0}")]
    EventNotFound(String),

    /// The account directory failed for a reason other than "no such account".
    #[error("Account lookup failed: {0}")]
    AccountLookup(#[source] LookupError),

    /// The document store call itself failed.
    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    /// A template failed to register or render.
    #[error("Template error: {0}")]
    Template(String),

    /// Composing or sending the message failed.
    #[error("Mail error: {0}")]
    Mail(#[from] MailError),
}

impl From<handlebars::RenderError> for InvitationError {
    fn from(err: handlebars::RenderError) -> Self {
        InvitationError::Template(err.to_string())
    }
}

impl From<handlebars::TemplateError> for InvitationError {
    fn from(err: handlebars::TemplateError) -> Self {
        InvitationError::Template(err.to_string())
    }
}

/// Account directory failures. `NotFound` is the only variant that means
/// "this address has no account"; every other variant means "could not tell".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("No account registered for this email")]
    NotFound,

    /// Transport failure or a 5xx from the directory.
    #[error("Account directory unavailable: {0}")]
    Unavailable(String),

    /// The directory refused the request (credentials, quota, bad request).
    #[error("Account directory rejected the request: {0}")]
    Rejected(String),

    /// The directory answered with something we could not decode.
    #[error("Malformed account directory response: {0}")]
    Malformed(String),
}

impl LookupError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LookupError::NotFound)
    }
}

/// Document store failures. A missing document is not an error (`Ok(None)`).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document store request failed: {0}")]
    Request(String),

    #[error("Document store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed document: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Request(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Mail transport failures.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

impl From<lettre::address::AddressError> for MailError {
    fn from(err: lettre::address::AddressError) -> Self {
        MailError::InvalidAddress(err.to_string())
    }
}

impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        MailError::Build(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        MailError::Transport(err.to_string())
    }
}
