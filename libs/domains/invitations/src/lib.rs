//! Invitations domain.
//!
//! Sends one email per newly created invitation document:
//! - recipient has an account: "You're invited to {title}!" with a dashboard link
//! - no account: "Join {title} on Our Platform!" with a signup link
//! - anything else: logged and dropped
//!
//! ```rust,ignore
//! let notifier = InvitationNotifier::new(store, directory, Arc::new(mailer), config)?;
//! let config = WorkerConfig::from_stream_def::<InvitationStream>();
//! let worker = TriggerWorker::new(redis, notifier, config);
//! worker.run(shutdown_rx).await?;
//! ```

pub mod directory;
pub mod error;
pub mod mailer;
pub mod models;
pub mod notifier;
pub mod publisher;
pub mod store;
pub mod streams;
pub mod templates;

pub use directory::{AccountDirectory, FirebaseAccountDirectory, InMemoryAccountDirectory};
pub use error::{
    InvitationError, InvitationResult, LookupError, MailError, MailResult, StoreError, StoreResult,
};
pub use mailer::{MailTransport, OutgoingMail, RecordingMailer, SentMail, SmtpMailer};
pub use models::{Account, EmailAddress, Event, Invitation, InvitationCreated};
pub use notifier::{Dispatch, DropReason, InvitationNotifier, NotifierConfig};
pub use publisher::InvitationPublisher;
pub use store::{EventStore, FirestoreEventStore, InMemoryEventStore};
pub use streams::InvitationStream;
pub use templates::InvitationTemplate;
