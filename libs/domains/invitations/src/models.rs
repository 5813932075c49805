//! Data models for the invitations domain.

use crate::error::{InvitationError, InvitationResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::LazyLock;
use stream_worker::StreamJob;
use uuid::Uuid;

/// Title used when the event document has none.
pub const FALLBACK_EVENT_TITLE: &str = "an event";

/// Greeting used when the account has no display name.
pub const FALLBACK_GREETING_NAME: &str = "there";

// Non-whitespace local part, '@', non-whitespace domain containing a dot.
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
});

// ============================================================================
// Email address
// ============================================================================

/// A recipient address that passed the syntactic check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: &str) -> InvitationResult<Self> {
        if EMAIL_PATTERN.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvitationError::InvalidRecipient(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Invitation (trigger payload)
// ============================================================================

/// The declared shape of an invitation document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub email: EmailAddress,
}

impl Invitation {
    /// Extract the recipient from the created document's fields.
    ///
    /// Absent, `null`, `false`, `0` and `""` all count as a missing recipient.
    /// Any other non-string value is reported as an invalid recipient.
    pub fn from_document(document: &Map<String, Value>) -> InvitationResult<Self> {
        let raw = match document.get("email") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => {
                return Err(InvitationError::MissingRecipient);
            }
            Some(Value::String(s)) if s.is_empty() => return Err(InvitationError::MissingRecipient),
            Some(Value::Number(n)) if n.as_f64() == Some(0.0) => {
                return Err(InvitationError::MissingRecipient);
            }
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        Ok(Self {
            email: EmailAddress::parse(&raw)?,
        })
    }
}

/// Trigger delivered once per newly created document at
/// `events/{event_id}/invitations/{invitation_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvitationCreated {
    pub event_id: String,
    pub invitation_id: String,
    /// The created document's fields, as written.
    #[serde(default)]
    pub document: Map<String, Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl InvitationCreated {
    pub fn new(
        event_id: impl Into<String>,
        invitation_id: impl Into<String>,
        document: Map<String, Value>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            invitation_id: invitation_id.into(),
            document,
            created_at: Utc::now(),
        }
    }

    /// A `{ "email": guest }` document under a fresh invitation id.
    pub fn for_guest(event_id: impl Into<String>, email: impl Into<String>) -> Self {
        let mut document = Map::new();
        document.insert("email".to_string(), Value::String(email.into()));
        Self::new(event_id, Uuid::new_v4().to_string(), document)
    }

    pub fn document_path(&self) -> String {
        format!("events/{}/invitations/{}", self.event_id, self.invitation_id)
    }

    /// Raw `email` field for log lines, whatever its type.
    pub fn raw_email(&self) -> Option<&Value> {
        self.document.get("email")
    }
}

impl StreamJob for InvitationCreated {
    fn job_id(&self) -> String {
        self.document_path()
    }
}

// ============================================================================
// Event (read-only to the notifier)
// ============================================================================

/// An event document as written by the event CRUD flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub featured_image: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// The title, or "an event" when absent or empty.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(FALLBACK_EVENT_TITLE)
    }
}

// ============================================================================
// Account (read-only lookup)
// ============================================================================

/// A registered account as exposed by the account directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(alias = "localId")]
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Account {
    /// Name to greet the invitee with: display name, or "there".
    pub fn greeting_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(FALLBACK_GREETING_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_email_pattern_accepts_plain_addresses() {
        for ok in ["sam@example.com", "a.b+c@sub.domain.io", "x@y.z"] {
            assert!(EmailAddress::parse(ok).is_ok(), "{ok} should be accepted");
        }
    }

    #[test]
    fn test_email_pattern_rejects_malformed_addresses() {
        for bad in ["no-at-sign", "a@b", "@b.com", "a@.", "a b@c.com", "a@b@c.com", " a@b.com"] {
            let result = EmailAddress::parse(bad);
            assert!(
                matches!(result, Err(InvitationError::InvalidRecipient(ref v)) if v == bad),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_invitation_missing_recipient_variants() {
        for document in [
            json!({}),
            json!({ "email": null }),
            json!({ "email": "" }),
            json!({ "email": false }),
            json!({ "email": 0 }),
            json!({ "mail": "sam@example.com" }),
        ] {
            let result = Invitation::from_document(&doc(document.clone()));
            assert!(
                matches!(result, Err(InvitationError::MissingRecipient)),
                "{document} should be a missing recipient"
            );
        }
    }

    #[test]
    fn test_invitation_non_string_email_is_invalid() {
        let result = Invitation::from_document(&doc(json!({ "email": 42 })));
        assert!(matches!(result, Err(InvitationError::InvalidRecipient(ref v)) if v == "42"));
    }

    #[test]
    fn test_invitation_extracts_valid_email() {
        let invitation =
            Invitation::from_document(&doc(json!({ "email": "sam@example.com" }))).unwrap();
        assert_eq!(invitation.email.as_str(), "sam@example.com");
    }

    #[test]
    fn test_trigger_job_id_is_document_path() {
        let trigger = InvitationCreated::new("evt-1", "inv-9", Map::new());
        assert_eq!(trigger.job_id(), "events/evt-1/invitations/inv-9");
    }

    #[test]
    fn test_trigger_for_guest() {
        let trigger = InvitationCreated::for_guest("evt-1", "sam@example.com");
        assert_eq!(trigger.raw_email(), Some(&json!("sam@example.com")));
        assert!(Uuid::parse_str(&trigger.invitation_id).is_ok());
    }

    #[test]
    fn test_trigger_deserializes_without_optional_fields() {
        let trigger: InvitationCreated =
            serde_json::from_value(json!({ "event_id": "e", "invitation_id": "i" })).unwrap();
        assert!(trigger.document.is_empty());
    }

    #[test]
    fn test_event_display_title_fallback() {
        assert_eq!(Event::titled("Launch Party").display_title(), "Launch Party");
        assert_eq!(Event::default().display_title(), "an event");
        assert_eq!(Event::titled("").display_title(), "an event");
    }

    #[test]
    fn test_event_deserializes_camel_case() {
        let event: Event = serde_json::from_value(json!({
            "title": "Launch Party",
            "ownerId": "user-1",
            "featuredImage": "https://img",
            "unknownField": true
        }))
        .unwrap();
        assert_eq!(event.owner_id.as_deref(), Some("user-1"));
        assert_eq!(event.featured_image.as_deref(), Some("https://img"));
    }

    #[test]
    fn test_account_greeting_name() {
        let sam = Account {
            uid: "u1".into(),
            email: None,
            display_name: Some("Sam".into()),
        };
        assert_eq!(sam.greeting_name(), "Sam");
        assert_eq!(Account::default().greeting_name(), "there");
    }
}
