//! Producer side of the invitation trigger.
//!
//! Saving an event with guests creates one invitation document per guest;
//! adding a guest later creates one more. Each creation is published here.

use redis::aio::ConnectionManager;
use std::collections::HashSet;
use stream_worker::{StreamError, StreamProducer};
use tracing::info;

use crate::models::InvitationCreated;
use crate::streams::InvitationStream;

/// Publishes `InvitationCreated` triggers to the invitation stream.
#[derive(Clone)]
pub struct InvitationPublisher {
    producer: StreamProducer,
}

impl InvitationPublisher {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            producer: StreamProducer::from_stream_def::<InvitationStream>(redis),
        }
    }

    /// Publish a single prepared trigger. Returns the stream entry ID.
    pub async fn publish(&self, trigger: &InvitationCreated) -> Result<String, StreamError> {
        let stream_id = self.producer.send(trigger).await?;
        info!(
            event_id = %trigger.event_id,
            invitation_id = %trigger.invitation_id,
            stream_id = %stream_id,
            "Published invitation"
        );
        Ok(stream_id)
    }

    /// Publish one invitation per guest of `event_id`.
    ///
    /// Addresses are not validated here; the notifier does that.
    pub async fn publish_guests<G: AsRef<str>>(
        &self,
        event_id: &str,
        guests: &[G],
    ) -> Result<Vec<String>, StreamError> {
        let triggers = guest_triggers(event_id, guests);
        let ids = self.producer.send_batch(&triggers).await?;
        info!(event_id = %event_id, count = ids.len(), "Published guest invitations");
        Ok(ids)
    }
}

/// Trimmed, non-empty guests, first occurrence wins (case-insensitive).
fn guest_triggers<G: AsRef<str>>(event_id: &str, guests: &[G]) -> Vec<InvitationCreated> {
    let mut seen = HashSet::new();
    guests
        .iter()
        .map(|g| g.as_ref().trim())
        .filter(|g| !g.is_empty())
        .filter(|g| seen.insert(g.to_lowercase()))
        .map(|g| InvitationCreated::for_guest(event_id, g))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_guest_triggers_trim_and_dedupe() {
        let triggers = guest_triggers(
            "evt-1",
            &[" sam@example.com ", "", "SAM@example.com", "   ", "alex@example.com"],
        );

        let emails: Vec<_> = triggers.iter().map(|t| t.raw_email().cloned()).collect();
        assert_eq!(
            emails,
            vec![Some(json!("sam@example.com")), Some(json!("alex@example.com"))]
        );
        assert!(triggers.iter().all(|t| t.event_id == "evt-1"));
        assert_ne!(triggers[0].invitation_id, triggers[1].invitation_id);
    }

    #[test]
    fn test_guest_triggers_keep_invalid_addresses() {
        let triggers = guest_triggers("evt-1", &["not-an-email"]);
        assert_eq!(triggers.len(), 1);
    }

    #[test]
    fn test_guest_triggers_empty() {
        let none: [&str; 0] = [];
        assert!(guest_triggers("evt-1", &none).is_empty());
    }
}
