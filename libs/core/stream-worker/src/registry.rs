//! Stream definitions and the handler contract.
//!
//! This module provides:
//! - `StreamDef` trait for domain-specific stream definitions
//! - `StreamJob` trait for trigger payloads
//! - `TriggerHandler` trait for the code invoked once per trigger
//! - `MessageKey` enum for stream entry field names

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use strum::{AsRefStr, Display, EnumString};

/// Standard message keys used in stream entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MessageKey {
    /// The trigger payload (JSON serialized).
    Job,
}

/// Stream definition trait.
///
/// Each domain implements this trait to name its stream and consumer group,
/// so producer and worker can never disagree on them.
///
/// ```rust,ignore
/// pub struct SignupStream;
///
/// impl StreamDef for SignupStream {
///     const STREAM_NAME: &'static str = "signups:created";
///     const CONSUMER_GROUP: &'static str = "signup_handlers";
/// }
/// ```
pub trait StreamDef: Send + Sync {
    /// The Redis stream name.
    const STREAM_NAME: &'static str;

    /// The consumer group name for this stream.
    const CONSUMER_GROUP: &'static str;

    /// Maximum stream length before approximate trimming (MAXLEN ~).
    const MAX_LENGTH: i64 = 100_000;

    /// Entries read per XREADGROUP call.
    const BATCH_SIZE: usize = 10;

    fn stream_name() -> &'static str {
        Self::STREAM_NAME
    }

    fn consumer_group() -> &'static str {
        Self::CONSUMER_GROUP
    }
}

/// A trigger payload carried in the `job` field of a stream entry.
pub trait StreamJob: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Identifier used in log lines.
    fn job_id(&self) -> String;
}

/// Code invoked once per delivered trigger.
///
/// Handlers own their failure handling: `handle` has no error channel, so the
/// worker has nothing to retry. Whatever a handler wants recorded about a
/// failed invocation, it logs itself.
#[async_trait]
pub trait TriggerHandler<J: StreamJob>: Send + Sync {
    async fn handle(&self, job: &J);

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}
