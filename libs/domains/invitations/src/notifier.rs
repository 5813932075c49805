//! The invitation notifier.
//!
//! One invocation per created invitation document: validate the recipient,
//! resolve the event, pick a template depending on whether the recipient
//! already has an account, send at most one email. Every failure is logged
//! here and swallowed; the host never sees an error.

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default};
use serde_json::Value;
use std::error::Error as StdError;
use std::sync::Arc;
use stream_worker::TriggerHandler;
use tracing::{error, info, instrument};

use crate::directory::AccountDirectory;
use crate::error::{InvitationError, InvitationResult, LookupError};
use crate::mailer::{MailTransport, OutgoingMail};
use crate::models::{FALLBACK_GREETING_NAME, Invitation, InvitationCreated};
use crate::store::EventStore;
use crate::templates::{InvitationEmailData, InvitationTemplate, TemplateEngine};

pub const DEFAULT_DASHBOARD_BASE_URL: &str = "https://yourapp.com";
pub const DEFAULT_SIGNUP_BASE_URL: &str = "https://eventmate.com";

const SIGNUP_LINK_LABEL: &str = "this link";

/// Link targets for the two templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    pub dashboard_base_url: String,
    pub signup_base_url: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            dashboard_base_url: DEFAULT_DASHBOARD_BASE_URL.to_string(),
            signup_base_url: DEFAULT_SIGNUP_BASE_URL.to_string(),
        }
    }
}

impl NotifierConfig {
    pub fn with_dashboard_base_url(mut self, url: impl Into<String>) -> Self {
        self.dashboard_base_url = url.into();
        self
    }

    pub fn with_signup_base_url(mut self, url: impl Into<String>) -> Self {
        self.signup_base_url = url.into();
        self
    }

    /// `{dashboard}/events/{event_id}`, with the id percent-encoded.
    pub fn event_link(&self, event_id: &str) -> String {
        format!(
            "{}/events/{}",
            self.dashboard_base_url.trim_end_matches('/'),
            urlencoding::encode(event_id)
        )
    }

    /// `{signup}/signup?invite={event_id}`, with the id percent-encoded.
    pub fn signup_link(&self, event_id: &str) -> String {
        format!(
            "{}/signup?invite={}",
            self.signup_base_url.trim_end_matches('/'),
            urlencoding::encode(event_id)
        )
    }

    /// The dashboard host, as shown in the link text.
    pub fn dashboard_label(&self) -> &str {
        let url = self.dashboard_base_url.trim_end_matches('/');
        url.split_once("://").map_or(url, |(_, host)| host)
    }
}

impl FromEnv for NotifierConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            dashboard_base_url: env_or_default("DASHBOARD_BASE_URL", DEFAULT_DASHBOARD_BASE_URL),
            signup_base_url: env_or_default("SIGNUP_BASE_URL", DEFAULT_SIGNUP_BASE_URL),
        })
    }
}

/// Why an invocation ended without sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    MissingRecipient,
    /// Carries the rejected value.
    InvalidRecipient(String),
    EventNotFound,
    /// The directory failed with something other than "no such account".
    AccountLookupFailed(String),
    /// Store, template or transport failure.
    Unexpected(String),
}

impl From<&InvitationError> for DropReason {
    fn from(err: &InvitationError) -> Self {
        match err {
            InvitationError::MissingRecipient => DropReason::MissingRecipient,
            InvitationError::InvalidRecipient(value) => DropReason::InvalidRecipient(value.clone()),
            InvitationError::EventNotFound(_) => DropReason::EventNotFound,
            InvitationError::AccountLookup(source) => {
                DropReason::AccountLookupFailed(source.to_string())
            }
            InvitationError::Store(_) | InvitationError::Template(_) | InvitationError::Mail(_) => {
                DropReason::Unexpected(err.to_string())
            }
        }
    }
}

/// Which exit an invocation took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Sent {
        template: InvitationTemplate,
        message_id: String,
    },
    Dropped(DropReason),
}

impl Dispatch {
    pub fn is_sent(&self) -> bool {
        matches!(self, Dispatch::Sent { .. })
    }
}

/// Sends the invitation email for a newly created invitation document.
pub struct InvitationNotifier<S, D, M>
where
    S: EventStore,
    D: AccountDirectory,
    M: MailTransport,
{
    store: Arc<S>,
    directory: Arc<D>,
    mailer: Arc<M>,
    templates: TemplateEngine,
    config: NotifierConfig,
}

impl<S, D, M> InvitationNotifier<S, D, M>
where
    S: EventStore,
    D: AccountDirectory,
    M: MailTransport,
{
    pub fn new(
        store: S,
        directory: D,
        mailer: Arc<M>,
        config: NotifierConfig,
    ) -> InvitationResult<Self> {
        Self::with_arcs(Arc::new(store), Arc::new(directory), mailer, config)
    }

    pub fn with_arcs(
        store: Arc<S>,
        directory: Arc<D>,
        mailer: Arc<M>,
        config: NotifierConfig,
    ) -> InvitationResult<Self> {
        Ok(Self {
            store,
            directory,
            mailer,
            templates: TemplateEngine::new()?,
            config,
        })
    }

    /// Run one invocation. Never fails: the outcome is logged and returned.
    #[instrument(
        name = "invitation",
        skip_all,
        fields(event_id = %trigger.event_id, invitation_id = %trigger.invitation_id)
    )]
    pub async fn handle(&self, trigger: &InvitationCreated) -> Dispatch {
        match self.deliver(trigger).await {
            Ok(dispatch) => dispatch,
            Err(err) => {
                log_failure(trigger, &err);
                Dispatch::Dropped(DropReason::from(&err))
            }
        }
    }

    async fn deliver(&self, trigger: &InvitationCreated) -> InvitationResult<Dispatch> {
        let invitation = Invitation::from_document(&trigger.document)?;
        let event_id = trigger.event_id.as_str();

        let event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or_else(|| InvitationError::EventNotFound(event_id.to_string()))?;
        let event_title = event.display_title().to_string();

        let (template, data) = match self.directory.find_by_email(&invitation.email).await {
            Ok(account) => (
                InvitationTemplate::AccountInvite,
                InvitationEmailData {
                    greeting_name: account.greeting_name().to_string(),
                    event_title,
                    link: self.config.event_link(event_id),
                    link_label: self.config.dashboard_label().to_string(),
                },
            ),
            Err(LookupError::NotFound) => (
                InvitationTemplate::JoinPlatform,
                InvitationEmailData {
                    greeting_name: FALLBACK_GREETING_NAME.to_string(),
                    event_title,
                    link: self.config.signup_link(event_id),
                    link_label: SIGNUP_LINK_LABEL.to_string(),
                },
            ),
            Err(other) => return Err(InvitationError::AccountLookup(other)),
        };

        let rendered = self.templates.render(template, &data)?;
        let mail = OutgoingMail {
            to: invitation.email,
            subject: rendered.subject,
            html_body: rendered.html,
            text_body: rendered.text,
        };

        let sent = self.mailer.send(&mail).await?;

        let message = match template {
            InvitationTemplate::AccountInvite => "Confirmation email sent",
            InvitationTemplate::JoinPlatform => "Registration invite sent",
        };
        info!(
            email = %mail.to,
            event_id = %event_id,
            message_id = %sent.message_id,
            transport = self.mailer.name(),
            "{message}"
        );

        Ok(Dispatch::Sent {
            template,
            message_id: sent.message_id,
        })
    }
}

fn log_failure(trigger: &InvitationCreated, err: &InvitationError) {
    let event_id = trigger.event_id.as_str();

    match err {
        InvitationError::MissingRecipient => {
            error!(event_id = %event_id, "No email found in invitation");
        }
        InvitationError::InvalidRecipient(value) => {
            error!(email = %value, event_id = %event_id, "Invalid email format");
        }
        InvitationError::EventNotFound(_) => {
            error!(event_id = %event_id, "Event not found");
        }
        InvitationError::AccountLookup(source) => {
            error!(
                email = %raw_email(trigger),
                event_id = %event_id,
                error = %source,
                error_chain = %error_chain(source),
                "Error processing invitation"
            );
        }
        InvitationError::Store(_) | InvitationError::Template(_) | InvitationError::Mail(_) => {
            error!(
                email = %raw_email(trigger),
                event_id = %event_id,
                error = %err,
                error_chain = %error_chain(err),
                "Unexpected error in invitation handler"
            );
        }
    }
}

fn raw_email(trigger: &InvitationCreated) -> String {
    match trigger.raw_email() {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// `err` followed by each of its sources, joined with `": "`.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    std::iter::successors(Some(err), |&e| e.source())
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}

#[async_trait]
impl<S, D, M> TriggerHandler<InvitationCreated> for InvitationNotifier<S, D, M>
where
    S: EventStore + 'static,
    D: AccountDirectory + 'static,
    M: MailTransport + 'static,
{
    async fn handle(&self, job: &InvitationCreated) {
        // The inherent `handle` already logged the outcome.
        InvitationNotifier::handle(self, job).await;
    }

    fn name(&self) -> &'static str {
        "InvitationNotifier"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MockAccountDirectory;
    use crate::error::StoreError;
    use crate::mailer::RecordingMailer;
    use crate::models::{Account, Event};
    use crate::store::MockEventStore;
    use serde_json::json;

    fn trigger(document: Value) -> InvitationCreated {
        InvitationCreated::new("evt-1", "inv-1", document.as_object().cloned().unwrap())
    }

    fn store_with(event: Option<Event>) -> MockEventStore {
        let mut store = MockEventStore::new();
        store
            .expect_get_event()
            .times(1)
            .returning(move |_| Ok(event.clone()));
        store
    }

    fn untouched_store() -> MockEventStore {
        let mut store = MockEventStore::new();
        store.expect_get_event().never();
        store
    }

    fn untouched_directory() -> MockAccountDirectory {
        let mut directory = MockAccountDirectory::new();
        directory.expect_find_by_email().never();
        directory
    }

    fn notifier(
        store: MockEventStore,
        directory: MockAccountDirectory,
        mailer: &RecordingMailer,
    ) -> InvitationNotifier<MockEventStore, MockAccountDirectory, RecordingMailer> {
        InvitationNotifier::new(
            store,
            directory,
            Arc::new(mailer.clone()),
            NotifierConfig::default(),
        )
            .unwrap()
    }

    #[test]
    fn test_config_links() {
        let config = NotifierConfig::default();
        assert_eq!(config.event_link("evt-1"), "https://yourapp.com/events/evt-1");
        assert_eq!(config.signup_link("evt-1"), "https://eventmate.com/signup?invite=evt-1");
        assert_eq!(config.dashboard_label(), "yourapp.com");

        let custom = NotifierConfig::default()
            .with_dashboard_base_url("http://localhost:3000/")
            .with_signup_base_url("http://localhost:3000/");
        assert_eq!(custom.event_link("e"), "http://localhost:3000/events/e");
        assert_eq!(custom.signup_link("e"), "http://localhost:3000/signup?invite=e");
        assert_eq!(custom.dashboard_label(), "localhost:3000");
    }

    #[test]
    fn test_config_links_encode_event_id() {
        let config = NotifierConfig::default();
        assert_eq!(config.event_link("a b/c"), "https://yourapp.com/events/a%20b%2Fc");
        assert_eq!(
            config.signup_link("x&invite=y"),
            "https://eventmate.com/signup?invite=x%26invite%3Dy"
        );
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("DASHBOARD_BASE_URL", Some("https://app.eventmate.dev")),
                ("SIGNUP_BASE_URL", None::<&str>),
            ],
            || {
                let config = NotifierConfig::from_env().unwrap();
                assert_eq!(config.dashboard_base_url, "https://app.eventmate.dev");
                assert_eq!(config.signup_base_url, DEFAULT_SIGNUP_BASE_URL);
            },
        );
    }

    #[tokio::test]
    async fn test_missing_email_touches_nothing() {
        let mailer = RecordingMailer::new();
        let notifier = notifier(untouched_store(), untouched_directory(), &mailer);

        let dispatch = notifier.handle(&trigger(json!({}))).await;

        assert_eq!(dispatch, Dispatch::Dropped(DropReason::MissingRecipient));
        assert_eq!(mailer.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_email_touches_nothing() {
        let mailer = RecordingMailer::new();
        let notifier = notifier(untouched_store(), untouched_directory(), &mailer);

        let dispatch = notifier.handle(&trigger(json!({ "email": "a@b" }))).await;

        assert_eq!(
            dispatch,
            Dispatch::Dropped(DropReason::InvalidRecipient("a@b".to_string()))
        );
        assert_eq!(mailer.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_event_skips_lookup() {
        let mailer = RecordingMailer::new();
        let notifier = notifier(store_with(None), untouched_directory(), &mailer);

        let dispatch = notifier.handle(&trigger(json!({ "email": "sam@example.com" }))).await;

        assert_eq!(dispatch, Dispatch::Dropped(DropReason::EventNotFound));
        assert_eq!(mailer.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_unexpected() {
        let mut store = MockEventStore::new();
        store
            .expect_get_event()
            .returning(|_| Err(StoreError::Request("connection reset".into())));
        let mailer = RecordingMailer::new();
        let notifier = notifier(store, untouched_directory(), &mailer);

        let dispatch = notifier.handle(&trigger(json!({ "email": "sam@example.com" }))).await;

        assert!(matches!(
            dispatch,
            Dispatch::Dropped(DropReason::Unexpected(ref m)) if m.contains("connection reset")
        ));
        assert_eq!(mailer.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_existing_account_gets_dashboard_invite() {
        let mut directory = MockAccountDirectory::new();
        directory
            .expect_find_by_email()
            .withf(|email| email.as_str() == "sam@example.com")
            .times(1)
            .returning(|_| {
                Ok(Account {
                    uid: "u1".into(),
                    email: Some("sam@example.com".into()),
                    display_name: Some("Sam".into()),
                })
            });
        let mailer = RecordingMailer::new();
        let store = store_with(Some(Event::titled("Launch Party")));
        let notifier = notifier(store, directory, &mailer);

        let dispatch = notifier.handle(&trigger(json!({ "email": "sam@example.com" }))).await;

        assert_eq!(
            dispatch,
            Dispatch::Sent {
                template: InvitationTemplate::AccountInvite,
                message_id: "recorded-1".into(),
            }
        );
        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "You're invited to Launch Party!");
        assert!(sent[0].html_body.contains("Hi Sam,"));
        assert!(sent[0].html_body.contains("https://yourapp.com/events/evt-1"));
    }

    #[tokio::test]
    async fn test_unknown_account_gets_signup_invite() {
        let mut directory = MockAccountDirectory::new();
        directory
            .expect_find_by_email()
            .times(1)
            .returning(|_| Err(LookupError::NotFound));
        let mailer = RecordingMailer::new();
        let notifier = notifier(store_with(Some(Event::default())), directory, &mailer);

        let dispatch = notifier.handle(&trigger(json!({ "email": "new@example.com" }))).await;

        assert!(matches!(
            dispatch,
            Dispatch::Sent { template: InvitationTemplate::JoinPlatform, .. }
        ));
        let sent = mailer.sent().await;
        assert_eq!(sent[0].subject, "Join an event on Our Platform!");
        assert!(sent[0].html_body.contains("Hi there,"));
        assert!(sent[0].text_body.contains("https://eventmate.com/signup?invite=evt-1"));
    }

    #[tokio::test]
    async fn test_lookup_outage_sends_nothing() {
        for failure in [
            LookupError::Unavailable("503".into()),
            LookupError::Rejected("403".into()),
            LookupError::Malformed("eof".into()),
        ] {
            let mut directory = MockAccountDirectory::new();
            let returned = failure.clone();
            directory
                .expect_find_by_email()
                .times(1)
                .returning(move |_| Err(returned.clone()));
            let mailer = RecordingMailer::new();
            let store = store_with(Some(Event::titled("Launch Party")));
        let notifier = notifier(store, directory, &mailer);

            let dispatch = notifier.handle(&trigger(json!({ "email": "sam@example.com" }))).await;

            assert_eq!(
                dispatch,
                Dispatch::Dropped(DropReason::AccountLookupFailed(failure.to_string()))
            );
            assert_eq!(mailer.sent_count().await, 0, "{failure:?} must not fall through");
        }
    }

    #[tokio::test]
    async fn test_send_failure_is_unexpected() {
        let mut directory = MockAccountDirectory::new();
        directory
            .expect_find_by_email()
            .returning(|_| Err(LookupError::NotFound));
        let mailer = RecordingMailer::failing("relay down");
        let store = store_with(Some(Event::titled("Launch Party")));
        let notifier = notifier(store, directory, &mailer);

        let dispatch = notifier.handle(&trigger(json!({ "email": "sam@example.com" }))).await;

        assert!(matches!(
            dispatch,
            Dispatch::Dropped(DropReason::Unexpected(ref m)) if m.contains("relay down")
        ));
    }

    #[test]
    fn test_error_chain_walks_sources() {
        let err = InvitationError::AccountLookup(LookupError::Unavailable("dns".into()));
        let chain = error_chain(&err);
        assert!(chain.starts_with("Account lookup failed"));
        assert!(chain.ends_with("Account directory unavailable: dns"));
    }

    #[test]
    fn test_raw_email_renders_any_json() {
        assert_eq!(raw_email(&trigger(json!({ "email": "a@b.co" }))), "a@b.co");
        assert_eq!(raw_email(&trigger(json!({ "email": 42 }))), "42");
        assert_eq!(raw_email(&trigger(json!({}))), "");
    }
}
