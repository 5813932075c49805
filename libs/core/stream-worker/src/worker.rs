//! The trigger worker loop.
//!
//! Reads entries through the consumer group, runs one time-boxed handler
//! invocation per entry with bounded parallelism, and acknowledges every
//! entry once whatever the invocation's fate. Entries a crashed process left
//! pending are picked up again: its own on restart, anyone's once idle past
//! `claim_min_idle`.

use crate::config::WorkerConfig;
use crate::consumer::{ReadBatch, StreamConsumer};
use crate::error::StreamError;
use crate::registry::{StreamJob, TriggerHandler};
use chrono::Utc;
use futures::FutureExt;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// How a single invocation ended, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    Completed,
    /// Exceeded the budget and was cancelled.
    TimedOut,
    /// The handler panicked.
    Panicked,
}

/// Run one handler invocation under the time budget.
///
/// The handler future is dropped (cancelled) when the budget runs out. A
/// panic inside the handler is contained here so it cannot take the worker
/// down.
pub async fn invoke<J, H>(handler: &H, job: &J, budget: Duration) -> Invocation
where
    J: StreamJob,
    H: TriggerHandler<J> + ?Sized,
{
    let guarded = AssertUnwindSafe(handler.handle(job)).catch_unwind();

    match tokio::time::timeout(budget, guarded).await {
        Ok(Ok(())) => Invocation::Completed,
        Ok(Err(_)) => {
            error!(
                job_id = %job.job_id(),
                handler = %handler.name(),
                "Invocation panicked"
            );
            Invocation::Panicked
        }
        Err(_) => {
            error!(
                job_id = %job.job_id(),
                handler = %handler.name(),
                budget_secs = budget.as_secs(),
                "Invocation exceeded its time budget and was abandoned"
            );
            Invocation::TimedOut
        }
    }
}

/// Feed batches from `read` to `dispatch` until `read` returns an empty one.
///
/// `read` receives a cursor: `"0"` first, then the `last_id` of the previous
/// batch. Returns how many entries were handed over.
async fn drain<J, R, RF, D, DF>(mut read: R, mut dispatch: D) -> Result<usize, StreamError>
where
    J: StreamJob,
    R: FnMut(String) -> RF,
    RF: Future<Output = Result<ReadBatch<J>, StreamError>>,
    D: FnMut(ReadBatch<J>) -> DF,
    DF: Future<Output = ()>,
{
    let mut cursor = String::from("0");
    let mut handed_over = 0;

    loop {
        let batch = read(cursor.clone()).await?;
        let Some(last_id) = batch.last_id.clone() else {
            return Ok(handed_over);
        };
        handed_over += batch.len();
        cursor = last_id;
        dispatch(batch).await;
    }
}

/// Delivers stream entries to a `TriggerHandler`.
pub struct TriggerWorker<J, H>
where
    J: StreamJob,
    H: TriggerHandler<J>,
{
    consumer: StreamConsumer,
    handler: Arc<H>,
    config: WorkerConfig,
    permits: Arc<Semaphore>,
    _phantom: PhantomData<J>,
}

impl<J, H> TriggerWorker<J, H>
where
    J: StreamJob + 'static,
    H: TriggerHandler<J> + 'static,
{
    pub fn new(redis: ConnectionManager, handler: H, config: WorkerConfig) -> Self {
        Self::with_arc_handler(redis, Arc::new(handler), config)
    }

    pub fn with_arc_handler(
        redis: ConnectionManager,
        handler: Arc<H>,
        config: WorkerConfig,
    ) -> Self {
        let consumer = StreamConsumer::new(redis, config.clone());
        let permits = Arc::new(Semaphore::new(config.max_concurrent_invocations));

        Self {
            consumer,
            handler,
            config,
            permits,
            _phantom: PhantomData,
        }
    }

    /// Run until the shutdown receiver flips to `true`.
    ///
    /// Shutdown is observed between reads, so it takes at most one
    /// `block_timeout_ms` plus the in-flight invocations to stop.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), StreamError> {
        info!(
            consumer_id = %self.config.consumer_id,
            stream = %self.config.stream_name,
            group = %self.config.consumer_group,
            handler = %self.handler.name(),
            max_concurrent_invocations = self.config.max_concurrent_invocations,
            invocation_timeout_secs = self.config.invocation_timeout.as_secs(),
            claim_min_idle_secs = self.config.claim_min_idle.as_secs(),
            "Starting trigger worker"
        );

        self.consumer.ensure_consumer_group().await?;
        self.redeliver_pending().await;
        self.claim_abandoned().await;
        let mut last_claim = Instant::now();

        let mut consecutive_errors: u32 = 0;
        const MAX_BACKOFF_SECS: u64 = 30;

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping worker");
                break;
            }

            if last_claim.elapsed() >= self.config.claim_interval {
                self.claim_abandoned().await;
                last_claim = Instant::now();
            }

            match self.consumer.read_new::<J>().await {
                Ok(batch) => {
                    if consecutive_errors > 0 {
                        info!(consecutive_errors, "Stream connection recovered");
                        consecutive_errors = 0;
                    }
                    if batch.is_empty() {
                        debug!("No new triggers");
                        continue;
                    }
                    self.dispatch(batch).await;
                }
                Err(e) => {
                    consecutive_errors += 1;

                    if e.is_nogroup_error() {
                        warn!("Consumer group missing, recreating");
                        if let Err(create_err) = self.consumer.ensure_consumer_group().await {
                            error!(error = %create_err, "Failed to recreate consumer group");
                        }
                    } else if e.is_connection_error() {
                        let backoff_secs =
                            std::cmp::min(2u64.pow(consecutive_errors.min(5)), MAX_BACKOFF_SECS);
                        warn!(
                            error = %e,
                            consecutive_errors,
                            backoff_secs,
                            "Redis connection error, backing off"
                        );
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    } else {
                        error!(error = %e, "Error reading trigger stream");
                    }

                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!("Trigger worker stopped");
        Ok(())
    }

    /// Our own entries from a previous run under the same consumer id.
    async fn redeliver_pending(&self) {
        let result = drain(
            move |after| async move { self.consumer.read_pending::<J>(&after).await },
            move |batch| self.dispatch(batch),
        )
        .await;

        match result {
            Ok(0) => {}
            Ok(count) => warn!(count, "Redelivered entries left unacknowledged by a previous run"),
            Err(e) => warn!(error = %e, "Failed to redeliver pending entries"),
        }
    }

    /// Entries other (dead) consumers were handed and never acknowledged.
    async fn claim_abandoned(&self) {
        let result = drain(
            move |_| async move { self.consumer.claim_abandoned::<J>().await },
            move |batch| self.dispatch(batch),
        )
        .await;

        match result {
            Ok(0) => debug!("No abandoned entries"),
            Ok(count) => info!(count, "Invoked claimed entries"),
            Err(e) => warn!(error = %e, "Failed to claim abandoned entries"),
        }
    }

    /// Invoke the handler for every decoded entry (bounded by the semaphore)
    /// and wait for the whole batch before reading again.
    async fn dispatch(&self, batch: ReadBatch<J>) {
        for stream_id in &batch.undecodable {
            self.ack(stream_id).await;
        }

        let mut join_set: JoinSet<()> = JoinSet::new();

        for event in batch.events {
            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                error!("Invocation semaphore closed");
                break;
            };

            let handler = Arc::clone(&self.handler);
            let consumer = self.consumer.clone();
            let budget = self.config.invocation_timeout;

            join_set.spawn(async move {
                let _permit = permit;
                let queued_ms = event.queued_for(Utc::now()).num_milliseconds();
                let outcome = invoke(handler.as_ref(), &event.job, budget).await;
                debug!(
                    stream_id = %event.stream_id,
                    job_id = %event.job_id(),
                    queued_ms,
                    outcome = ?outcome,
                    "Invocation finished"
                );

                if let Err(e) = consumer.ack(&event.stream_id).await {
                    warn!(stream_id = %event.stream_id, error = %e, "Failed to acknowledge entry");
                }
            });
        }

        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Invocation task failed");
            }
        }
    }

    async fn ack(&self, stream_id: &str) {
        if let Err(e) = self.consumer.ack(stream_id).await {
            warn!(stream_id = %stream_id, error = %e, "Failed to acknowledge entry");
        }
    }
}
