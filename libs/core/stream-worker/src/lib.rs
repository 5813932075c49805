//! Stream Worker
//!
//! Delivers triggers from a Redis Stream to a handler, one invocation per
//! stream entry.
//!
//! ## Delivery semantics
//!
//! - **Consumer groups**: several worker processes share one stream
//! - **Bounded parallelism**: up to `max_concurrent_invocations` handlers run at once
//! - **Invocation budget**: each invocation is abandoned after `invocation_timeout`
//! - **Acknowledge once**: every entry is acknowledged after its invocation
//!   finishes or is abandoned; there is no DLQ
//! - **Recovery**: entries left pending by a dead consumer are claimed once
//!   they sit idle past `claim_min_idle`, and redelivered once
//! - **Graceful shutdown**: a `watch` channel stops the read loop, in-flight
//!   invocations run to completion
//!
//! ## Example
//!
//! ```ignore
//! use stream_worker::{StreamDef, StreamJob, TriggerHandler, TriggerWorker, WorkerConfig};
//!
//! struct SignupStream;
//! impl StreamDef for SignupStream {
//!     const STREAM_NAME: &'static str = "signups:created";
//!     const CONSUMER_GROUP: &'static str = "signup_handlers";
//! }
//!
//! let config = WorkerConfig::from_stream_def::<SignupStream>();
//! let worker = TriggerWorker::new(redis, handler, config);
//! worker.run(shutdown_rx).await?;
//! ```

mod config;
mod consumer;
mod error;
mod event;
mod producer;
mod registry;
mod worker;

pub use config::WorkerConfig;
pub use consumer::{ReadBatch, StreamConsumer, connect};
pub use error::StreamError;
pub use event::StreamEvent;
pub use producer::StreamProducer;
pub use registry::{MessageKey, StreamDef, StreamJob, TriggerHandler};
pub use worker::{Invocation, TriggerWorker, invoke};
