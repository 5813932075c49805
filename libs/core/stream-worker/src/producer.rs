//! Stream producer for trigger publishing
//!
//! ```rust,ignore
//! let producer = StreamProducer::from_stream_def::<SignupStream>(redis);
//! let stream_id = producer.send(&trigger).await?;
//! ```

use crate::error::StreamError;
use crate::registry::{MessageKey, StreamDef};
use redis::aio::ConnectionManager;
use serde::Serialize;
use tracing::debug;

/// Appends triggers to a stream.
#[derive(Clone)]
pub struct StreamProducer {
    redis: ConnectionManager,
    stream_name: String,
    max_length: i64,
}

impl StreamProducer {
    pub fn new(redis: ConnectionManager, stream_name: impl Into<String>) -> Self {
        Self {
            redis,
            stream_name: stream_name.into(),
            max_length: 100_000,
        }
    }

    /// Keeps stream name and trimming consistent with the worker's `StreamDef`.
    pub fn from_stream_def<S: StreamDef>(redis: ConnectionManager) -> Self {
        Self {
            redis,
            stream_name: S::STREAM_NAME.to_string(),
            max_length: S::MAX_LENGTH,
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Append one trigger. Returns the Redis stream entry ID.
    pub async fn send<J: Serialize>(&self, job: &J) -> Result<String, StreamError> {
        let mut conn = self.redis.clone();

        let job_json = serde_json::to_string(job)?;

        let stream_id: String = redis::cmd("XADD")
            .arg(&self.stream_name)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg(MessageKey::Job.as_ref())
            .arg(&job_json)
            .query_async(&mut conn)
            .await?;

        debug!(
            stream = %self.stream_name,
            stream_id = %stream_id,
            "Appended trigger"
        );

        Ok(stream_id)
    }

    /// Append several triggers in one pipeline.
    pub async fn send_batch<J: Serialize>(&self, jobs: &[J]) -> Result<Vec<String>, StreamError> {
        if jobs.is_empty() {
            return Ok(vec![]);
        }

        let mut conn = self.redis.clone();
        let mut pipe = redis::pipe();

        for job in jobs {
            let job_json = serde_json::to_string(job)?;
            pipe.cmd("XADD")
                .arg(&self.stream_name)
                .arg("MAXLEN")
                .arg("~")
                .arg(self.max_length)
                .arg("*")
                .arg(MessageKey::Job.as_ref())
                .arg(job_json);
        }

        let ids: Vec<String> = pipe.query_async(&mut conn).await?;

        debug!(
            stream = %self.stream_name,
            count = ids.len(),
            "Appended trigger batch"
        );

        Ok(ids)
    }
}
