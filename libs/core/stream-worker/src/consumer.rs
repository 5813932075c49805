//! Stream consumer for Redis operations
//!
//! Reads trigger entries through a consumer group, claims entries abandoned
//! by dead consumers, and acknowledges them.

use crate::config::WorkerConfig;
use crate::error::StreamError;
use crate::event::StreamEvent;
use crate::registry::{MessageKey, StreamJob};
use redis::aio::ConnectionManager;
use redis::RedisResult;
use tracing::{debug, info, warn};

type StreamEntry = (String, Vec<(String, String)>);
type StreamReply = Vec<(String, Vec<StreamEntry>)>;
/// XPENDING extended form: id, owner, idle ms, delivery count.
type PendingEntry = (String, String, u64, u64);

/// Open a multiplexed, auto-reconnecting connection.
pub async fn connect(url: &str) -> Result<ConnectionManager, StreamError> {
    let client = redis::Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;
    Ok(manager)
}

/// Entries read in one call: decoded triggers plus the IDs of entries that
/// could not be decoded (these still need acknowledging).
#[derive(Debug)]
pub struct ReadBatch<J: StreamJob> {
    pub events: Vec<StreamEvent<J>>,
    pub undecodable: Vec<String>,
    /// ID of the last entry in the reply, decodable or not.
    pub last_id: Option<String>,
}

impl<J: StreamJob> ReadBatch<J> {
    pub(crate) fn empty() -> Self {
        Self {
            events: Vec::new(),
            undecodable: Vec::new(),
            last_id: None,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len() + self.undecodable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stream consumer for Redis operations
#[derive(Clone)]
pub struct StreamConsumer {
    redis: ConnectionManager,
    config: WorkerConfig,
}

impl StreamConsumer {
    pub fn new(redis: ConnectionManager, config: WorkerConfig) -> Self {
        Self { redis, config }
    }

    /// Create the consumer group (and the stream) unless it already exists.
    pub async fn ensure_consumer_group(&self) -> Result<(), StreamError> {
        let mut conn = self.redis.clone();

        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$") // Only triggers created from now on
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Created consumer group"
                );
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Consumer group already exists"
                );
            }
            Err(e) => return Err(StreamError::Redis(e)),
        }

        Ok(())
    }

    /// Entries delivered to this consumer earlier but never acknowledged
    /// (the process died mid-invocation), starting after `after`.
    ///
    /// Pass `"0"` first, then the previous batch's `last_id`, until a batch
    /// comes back empty.
    pub async fn read_pending<J: StreamJob>(
        &self,
        after: &str,
    ) -> Result<ReadBatch<J>, StreamError> {
        let mut conn = self.redis.clone();

        let result: RedisResult<StreamReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("COUNT")
            .arg(self.config.batch_size)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(after)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(streams) => Ok(parse_stream_reply(streams)),
            Err(e) if e.to_string().contains("NOGROUP") => Ok(ReadBatch::empty()),
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    /// New entries, blocking up to `block_timeout_ms` when none are waiting.
    pub async fn read_new<J: StreamJob>(&self) -> Result<ReadBatch<J>, StreamError> {
        let mut conn = self.redis.clone();

        let result: RedisResult<Option<StreamReply>> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("BLOCK")
            .arg(self.config.block_timeout_ms)
            .arg("COUNT")
            .arg(self.config.batch_size)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(Some(streams)) => Ok(parse_stream_reply(streams)),
            Ok(None) => Ok(ReadBatch::empty()),
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    /// Take over entries that have sat unacknowledged under any consumer for
    /// at least `claim_min_idle`.
    ///
    /// Claiming resets the idle time, so calling this until it returns an
    /// empty batch terminates. Needs Redis 6.2+ for `XPENDING ... IDLE`.
    pub async fn claim_abandoned<J: StreamJob>(&self) -> Result<ReadBatch<J>, StreamError> {
        let mut conn = self.redis.clone();
        let min_idle_ms = self.config.claim_min_idle_ms();

        let pending: RedisResult<Vec<PendingEntry>> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(self.config.batch_size)
            .query_async(&mut conn)
            .await;

        let pending = match pending {
            Ok(p) => p,
            Err(e) if e.to_string().contains("NOGROUP") => return Ok(ReadBatch::empty()),
            Err(e) => return Err(StreamError::Redis(e)),
        };

        let claim_ids = claimable_ids(&pending, min_idle_ms);
        if claim_ids.is_empty() {
            return Ok(ReadBatch::empty());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg(min_idle_ms);
        for id in &claim_ids {
            cmd.arg(id);
        }

        // Entries trimmed from the stream since delivery come back as nil
        let claimed: Vec<Option<StreamEntry>> = cmd.query_async(&mut conn).await?;
        let batch = parse_entries(claimed.into_iter().flatten());

        if !batch.is_empty() {
            warn!(
                count = batch.len(),
                previous_owners = ?owners(&pending, &claim_ids),
                "Claimed abandoned entries"
            );
        }
        Ok(batch)
    }

    pub async fn ack(&self, stream_id: &str) -> Result<(), StreamError> {
        let mut conn = self.redis.clone();

        let _: i64 = redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(stream_id)
            .query_async(&mut conn)
            .await?;

        debug!(stream_id = %stream_id, "Acknowledged entry");
        Ok(())
    }
}

fn parse_stream_reply<J: StreamJob>(streams: StreamReply) -> ReadBatch<J> {
    parse_entries(streams.into_iter().flat_map(|(_stream_name, entries)| entries))
}

fn parse_entries<J: StreamJob>(entries: impl IntoIterator<Item = StreamEntry>) -> ReadBatch<J> {
    let mut batch = ReadBatch::empty();
    for (stream_id, fields) in entries {
        batch.last_id = Some(stream_id.clone());
        match decode_entry::<J>(&fields) {
            Ok(job) => batch.events.push(StreamEvent::new(stream_id, job)),
            Err(reason) => {
                warn!(stream_id = %stream_id, reason = %reason, "Dropping undecodable entry");
                batch.undecodable.push(stream_id);
            }
        }
    }
    batch
}

/// IDs idle for at least `min_idle_ms`.
fn claimable_ids(pending: &[PendingEntry], min_idle_ms: u64) -> Vec<String> {
    pending
        .iter()
        .filter(|(_, _, idle_ms, _)| *idle_ms >= min_idle_ms)
        .map(|(id, _, _, _)| id.clone())
        .collect()
}

fn owners(pending: &[PendingEntry], claimed: &[String]) -> Vec<String> {
    let mut owners: Vec<String> = pending
        .iter()
        .filter(|(id, _, _, _)| claimed.contains(id))
        .map(|(_, owner, _, _)| owner.clone())
        .collect();
    owners.sort();
    owners.dedup();
    owners
}

fn decode_entry<J: StreamJob>(fields: &[(String, String)]) -> Result<J, String> {
    let payload = fields
        .iter()
        .find(|(k, _)| k == MessageKey::Job.as_ref())
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| {
            format!(
                "missing '{}' field (fields: {:?})",
                MessageKey::Job,
                fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>()
            )
        })?;

    serde_json::from_str::<J>(payload).map_err(|e| e.to_string())
}
