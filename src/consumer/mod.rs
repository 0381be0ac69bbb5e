//! Stream ingestion pipeline
//!
//! ```text
//! MessageSource → decode → OrderValidator → OrderRepository (retry) → commit
//! ```
//!
//! An [`OrderConsumer`] pulls one message at a time from a [`MessageSource`],
//! hands it to a [`MessageProcessor`] and commits its offset once the message
//! is handled. Malformed and invalid messages are committed too, so they are
//! never redelivered. A message whose write was abandoned because of shutdown
//! is left uncommitted and comes back on the next run.
//!
//! Backends:
//! - [`InMemoryBroker`]: partitioned in-process log with consumer groups
//! - `kafka` feature: [`KafkaSource`] over `rdkafka`

use async_trait::async_trait;
use std::fmt;

pub mod memory;
pub mod processor;
pub mod retry;
pub mod worker;

#[cfg(feature = "kafka")]
pub mod kafka;

#[cfg(feature = "kafka")]
pub use kafka::KafkaSource;
pub use memory::{InMemoryBroker, InMemorySource};
pub use processor::{MessageProcessor, OrderMessageProcessor, ProcessError, ProcessOutcome, Rejection};
pub use retry::{Backoff, RetryError, RetryPolicy};
pub use worker::{ConsumerStats, OrderConsumer};

// =============================================================================
// Messages and sources
// =============================================================================

/// A message pulled from a stream partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// Where a source reads from, for logging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInfo {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "topic={} group={} brokers={}",
            self.topic, self.group_id, self.brokers
        )
    }
}

/// Errors raised by a [`MessageSource`]
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The source has been closed; no more messages will arrive
    #[error("message source is closed")]
    Closed,

    /// Fetching the next message failed
    #[error("failed to fetch message: {message}")]
    Fetch { message: String },

    /// Committing an offset failed
    #[error("failed to commit offset {offset} on {topic}[{partition}]: {message}")]
    Commit {
        topic: String,
        partition: i32,
        offset: i64,
        message: String,
    },

    /// The source could not be created or subscribed
    #[error("failed to connect to {brokers}: {message}")]
    Connection { brokers: String, message: String },
}

/// Pull-based access to a partitioned message stream
///
/// Offsets are committed explicitly; committing a message means it will not
/// be delivered again to the same consumer group.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait for the next message
    ///
    /// Must be cancel-safe: dropping the future loses no message.
    async fn next_message(&self) -> Result<StreamMessage, BrokerError>;

    /// Mark `message` and everything before it in its partition as handled
    async fn commit(&self, message: &StreamMessage) -> Result<(), BrokerError>;

    /// Release the connection
    async fn close(&self) -> Result<(), BrokerError>;

    fn info(&self) -> SourceInfo;
}

// =============================================================================
// Consumers
// =============================================================================

/// Lifecycle of a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Constructed, not yet started
    Idle,
    Running,
    /// Shutdown observed, releasing the source
    Stopping,
    Stopped,
}

/// Errors that end a consumer run
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// A long-running stream consumer
#[async_trait]
pub trait Consumer: Send {
    /// Consume until `shutdown` is cancelled or the source closes
    async fn run(
        &mut self,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> Result<ConsumerStats, ConsumerError>;

    fn state(&self) -> ConsumerState;
}
