//! Worker configuration

use crate::error::StreamError;
use crate::registry::StreamDef;
use core_config::env_parse_or;
use std::time::Duration;
use uuid::Uuid;

/// Default per-invocation processing budget.
pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Idle time beyond the invocation budget before an entry counts as abandoned.
const CLAIM_GRACE: Duration = Duration::from_secs(60);

/// Configuration for the trigger worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Redis stream name
    pub stream_name: String,

    /// Consumer group name
    pub consumer_group: String,

    /// Unique consumer ID within the group
    pub consumer_id: String,

    /// Maximum stream length used by producers (MAXLEN ~)
    pub max_length: i64,

    /// Entries read per XREADGROUP call
    pub batch_size: usize,

    /// XREADGROUP BLOCK timeout in milliseconds
    pub block_timeout_ms: u64,

    /// Upper bound on invocations running at once
    pub max_concurrent_invocations: usize,

    /// Budget after which an invocation is abandoned
    pub invocation_timeout: Duration,

    /// Pending entries idle this long belong to a dead consumer
    pub claim_min_idle: Duration,

    /// How often the loop looks for abandoned entries
    pub claim_interval: Duration,
}

impl WorkerConfig {
    pub fn from_stream_def<S: StreamDef>() -> Self {
        Self {
            stream_name: S::STREAM_NAME.to_string(),
            consumer_group: S::CONSUMER_GROUP.to_string(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            max_length: S::MAX_LENGTH,
            batch_size: S::BATCH_SIZE,
            block_timeout_ms: 5000,
            max_concurrent_invocations: 16,
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
            claim_min_idle: DEFAULT_INVOCATION_TIMEOUT + CLAIM_GRACE,
            claim_interval: Duration::from_secs(60),
        }
    }

    /// Apply `INVOCATION_TIMEOUT_SECS`, `MAX_CONCURRENT_INVOCATIONS`,
    /// `CLAIM_MIN_IDLE_SECS` and `WORKER_CONSUMER_ID` when set.
    ///
    /// Without `CLAIM_MIN_IDLE_SECS`, the claim threshold follows a raised
    /// invocation budget.
    pub fn with_env_overrides(mut self) -> Result<Self, StreamError> {
        let timeout_secs = env_parse_or(
            "INVOCATION_TIMEOUT_SECS",
            self.invocation_timeout.as_secs(),
        )?;
        self.invocation_timeout = Duration::from_secs(timeout_secs);
        let default_idle = self.claim_min_idle.max(self.invocation_timeout + CLAIM_GRACE);
        let idle_secs = env_parse_or("CLAIM_MIN_IDLE_SECS", default_idle.as_secs())?;
        self.claim_min_idle = Duration::from_secs(idle_secs);
        self.max_concurrent_invocations =
            env_parse_or("MAX_CONCURRENT_INVOCATIONS", self.max_concurrent_invocations)?;
        if let Ok(id) = std::env::var("WORKER_CONSUMER_ID") {
            self.consumer_id = id;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_block_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.block_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_concurrent_invocations(mut self, max: usize) -> Self {
        self.max_concurrent_invocations = max;
        self
    }

    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    pub fn with_claim_min_idle(mut self, idle: Duration) -> Self {
        self.claim_min_idle = idle;
        self
    }

    pub fn with_claim_interval(mut self, interval: Duration) -> Self {
        self.claim_interval = interval;
        self
    }

    pub(crate) fn claim_min_idle_ms(&self) -> u64 {
        u64::try_from(self.claim_min_idle.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.max_concurrent_invocations == 0 {
            return Err(StreamError::Config(
                "max_concurrent_invocations must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(StreamError::Config("batch_size must be at least 1".to_string()));
        }
        if self.invocation_timeout.is_zero() {
            return Err(StreamError::Config(
                "invocation_timeout must be greater than zero".to_string(),
            ));
        }
        // A shorter threshold would steal entries whose invocation is still running
        if self.claim_min_idle <= self.invocation_timeout {
            return Err(StreamError::Config(format!(
                "claim_min_idle ({}s) must exceed invocation_timeout ({}s)",
                self.claim_min_idle.as_secs(),
                self.invocation_timeout.as_secs()
            )));
        }
        if self.claim_interval.is_zero() {
            return Err(StreamError::Config(
                "claim_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
