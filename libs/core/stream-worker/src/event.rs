//! Stream event wrapper
//!
//! Wraps a trigger with its stream metadata.

use crate::registry::StreamJob;
use chrono::{DateTime, Utc};

/// A delivered trigger plus the stream entry it came from.
#[derive(Debug, Clone)]
pub struct StreamEvent<J: StreamJob> {
    /// Redis stream entry ID (e.g., "1234567890123-0")
    pub stream_id: String,

    /// The trigger payload
    pub job: J,

    /// When the entry was appended (parsed from the stream ID)
    pub timestamp: DateTime<Utc>,
}

impl<J: StreamJob> StreamEvent<J> {
    pub fn new(stream_id: String, job: J) -> Self {
        let timestamp = Self::parse_timestamp(&stream_id);
        Self {
            stream_id,
            job,
            timestamp,
        }
    }

    /// Stream IDs are "timestamp_ms-sequence".
    fn parse_timestamp(stream_id: &str) -> DateTime<Utc> {
        stream_id
            .split('-')
            .next()
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now)
    }

    pub fn job_id(&self) -> String {
        self.job.job_id()
    }

    /// Time between the append and `now`.
    pub fn queued_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}
