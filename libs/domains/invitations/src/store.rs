//! Read access to event documents.

use async_trait::async_trait;
use core_config::firebase::FirebaseConfig;
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::models::Event;

/// Store trait for reading event documents
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Fetch `events/{event_id}`. `Ok(None)` when the document does not exist.
    async fn get_event(&self, event_id: &str) -> StoreResult<Option<Event>>;
}

/// In-memory implementation of EventStore (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<HashMap<String, Event>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, event_id: impl Into<String>, event: Event) {
        self.events.write().await.insert(event_id.into(), event);
    }

    pub async fn remove(&self, event_id: &str) -> Option<Event> {
        self.events.write().await.remove(event_id)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn get_event(&self, event_id: &str) -> StoreResult<Option<Event>> {
        let events = self.events.read().await;
        Ok(events.get(event_id).cloned())
    }
}

/// Firestore REST implementation of EventStore.
#[derive(Debug, Clone)]
pub struct FirestoreEventStore {
    client: reqwest::Client,
    config: FirebaseConfig,
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    #[serde(default)]
    fields: Map<String, Value>,
}

impl FirestoreEventStore {
    pub fn new(client: reqwest::Client, config: FirebaseConfig) -> Self {
        Self { client, config }
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/events/{}", self.config.documents_url(), event_id)
    }
}

#[async_trait]
impl EventStore for FirestoreEventStore {
    async fn get_event(&self, event_id: &str) -> StoreResult<Option<Event>> {
        let mut request = self.client.get(self.event_url(event_id));
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(event_id = %event_id, "Event document does not exist");
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let document: FirestoreDocument = response.json().await?;
        let event = decode_fields(document.fields)?;
        Ok(Some(event))
    }
}

/// Flatten Firestore typed values (`{"stringValue": "..."}`) into plain JSON
/// and deserialize the result.
fn decode_fields(fields: Map<String, Value>) -> StoreResult<Event> {
    let mut plain = Map::with_capacity(fields.len());
    for (key, typed) in fields {
        plain.insert(key, decode_value(typed)?);
    }
    Ok(serde_json::from_value(Value::Object(plain))?)
}

fn decode_value(typed: Value) -> StoreResult<Value> {
    let Value::Object(mut wrapper) = typed else {
        return Err(StoreError::Decode(format!("expected typed value, got {typed}")));
    };

    let Some((kind, inner)) = wrapper.iter_mut().next().map(|(k, v)| (k.clone(), v.take())) else {
        return Err(StoreError::Decode("empty typed value".to_string()));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" | "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => {
            Ok(inner)
        }
        "doubleValue" | "geoPointValue" => Ok(inner),
        // int64 travels as a decimal string
        "integerValue" => match &inner {
            Value::String(s) => s
                .parse::<i64>()
                .map(|n| Value::Number(Number::from(n)))
                .map_err(|e| StoreError::Decode(format!("integerValue {s:?}: {e}"))),
            _ => Ok(inner),
        },
        "arrayValue" => {
            let values = match inner {
                Value::Object(mut array) => array.remove("values").unwrap_or(Value::Array(vec![])),
                other => other,
            };
            let Value::Array(items) = values else {
                return Err(StoreError::Decode("arrayValue.values is not a list".to_string()));
            };
            items
                .into_iter()
                .map(decode_value)
                .collect::<StoreResult<Vec<_>>>()
                .map(Value::Array)
        }
        "mapValue" => {
            let fields = match inner {
                Value::Object(mut map) => match map.remove("fields") {
                    Some(Value::Object(fields)) => fields,
                    _ => Map::new(),
                },
                _ => Map::new(),
            };
            let mut plain = Map::with_capacity(fields.len());
            for (key, typed) in fields {
                plain.insert(key, decode_value(typed)?);
            }
            Ok(Value::Object(plain))
        }
        other => Err(StoreError::Decode(format!("unsupported value type {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_get_event() {
        let store = InMemoryEventStore::new();
        store.insert("evt-1", Event::titled("Launch Party")).await;

        let found = store.get_event("evt-1").await.unwrap();
        assert_eq!(found.unwrap().display_title(), "Launch Party");

        assert!(store.get_event("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_remove() {
        let store = InMemoryEventStore::new();
        store.insert("evt-1", Event::default()).await;
        assert!(store.remove("evt-1").await.is_some());
        assert!(store.get_event("evt-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mock_store_can_fail() {
        let mut store = MockEventStore::new();
        store.expect_get_event().returning(|_| {
            Err(StoreError::Request("connection reset".to_string()))
        });

        assert!(store.get_event("evt-1").await.is_err());
    }

    #[test]
    fn test_decode_firestore_event_document() {
        let event = decode_fields(fields(json!({
            "title": { "stringValue": "Launch Party" },
            "ownerId": { "stringValue": "user-1" },
            "location": { "stringValue": "Berlin" },
            "createdAt": { "timestampValue": "2024-05-01T10:00:00Z" },
            "guests": { "arrayValue": { "values": [{ "stringValue": "a@b.co" }] } },
            "capacity": { "integerValue": "40" },
            "extra": { "mapValue": { "fields": { "nested": { "booleanValue": true } } } }
        })))
        .unwrap();

        assert_eq!(event.title.as_deref(), Some("Launch Party"));
        assert_eq!(event.owner_id.as_deref(), Some("user-1"));
        assert_eq!(event.location.as_deref(), Some("Berlin"));
        assert!(event.created_at.is_some());
    }

    #[test]
    fn test_decode_document_without_title() {
        let event = decode_fields(fields(json!({
            "title": { "nullValue": null }
        })))
        .unwrap();
        assert_eq!(event.display_title(), "an event");
    }

    #[test]
    fn test_decode_empty_array_value() {
        let value = decode_value(json!({ "arrayValue": {} })).unwrap();
        assert_eq!(value, json!([]));
    }

    #[test]
    fn test_decode_rejects_unknown_value_type() {
        let err = decode_value(json!({ "vectorValue": {} })).unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[test]
    fn test_event_url() {
        let store = FirestoreEventStore::new(
            reqwest::Client::new(),
            FirebaseConfig::new("demo-project"),
        );
        assert_eq!(
            store.event_url("evt-1"),
            "https://firestore.googleapis.com/v1/projects/demo-project/databases/(default)/documents/events/evt-1"
        );
    }
}
