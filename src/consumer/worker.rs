//! The consume loop

use crate::consumer::{
    BrokerError, Consumer, ConsumerError, ConsumerState, MessageProcessor, MessageSource,
    ProcessOutcome, StreamMessage,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Counters for one consumer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub persisted: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub commit_failures: u64,
}

/// Sequential consumer driving a [`MessageProcessor`] from a [`MessageSource`]
///
/// Messages are handled strictly one after another, and each offset is
/// committed before the next message is pulled.
pub struct OrderConsumer {
    source: Arc<dyn MessageSource>,
    processor: Arc<dyn MessageProcessor>,
    state: watch::Sender<ConsumerState>,
    fetch_backoff: Duration,
}

impl OrderConsumer {
    pub fn new(source: Arc<dyn MessageSource>, processor: Arc<dyn MessageProcessor>) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self {
            source,
            processor,
            state,
            fetch_backoff: Duration::from_secs(1),
        }
    }

    /// Delay before pulling again after a fetch error
    pub fn with_fetch_backoff(mut self, backoff: Duration) -> Self {
        self.fetch_backoff = backoff;
        self
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }

    async fn commit(&self, message: &StreamMessage, stats: &mut ConsumerStats) {
        match self.source.commit(message).await {
            Ok(()) => tracing::debug!(
                partition = message.partition,
                offset = message.offset,
                "Offset committed"
            ),
            Err(e) => {
                stats.commit_failures += 1;
                tracing::error!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Failed to commit offset"
                );
            }
        }
    }

    async fn consume(
        &self,
        shutdown: &CancellationToken,
        stats: &mut ConsumerStats,
    ) -> Result<(), ConsumerError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                next = self.source.next_message() => next,
            };

            let message = match next {
                Ok(message) => message,
                Err(BrokerError::Closed) => return Ok(()),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to fetch message");
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.fetch_backoff) => continue,
                    }
                }
            };
            stats.received += 1;

            match self.processor.process(&message, shutdown).await {
                Ok(outcome) => {
                    match outcome {
                        ProcessOutcome::Persisted { .. } => stats.persisted += 1,
                        ProcessOutcome::Duplicate { .. } => stats.duplicates += 1,
                        ProcessOutcome::Rejected(_) => stats.rejected += 1,
                    }
                    self.commit(&message, stats).await;
                }
                Err(e) if e.is_cancelled() => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl Consumer for OrderConsumer {
    async fn run(&mut self, shutdown: CancellationToken) -> Result<ConsumerStats, ConsumerError> {
        let info = self.source.info();
        self.set_state(ConsumerState::Running);
        tracing::info!(
            topic = %info.topic,
            group_id = %info.group_id,
            brokers = %info.brokers,
            "Consumer started"
        );

        let mut stats = ConsumerStats::default();
        let result = self.consume(&shutdown, &mut stats).await;

        self.set_state(ConsumerState::Stopping);
        if let Err(e) = self.source.close().await {
            tracing::warn!(error = %e, "Failed to close message source");
        }
        self.set_state(ConsumerState::Stopped);

        match &result {
            Ok(()) => tracing::info!(
                topic = %info.topic,
                received = stats.received,
                persisted = stats.persisted,
                duplicates = stats.duplicates,
                rejected = stats.rejected,
                "Consumer stopped"
            ),
            Err(e) => tracing::error!(topic = %info.topic, error = %e, "Consumer stopped with error"),
        }

        result.map(|()| stats)
    }

    fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }
}
