//! Kafka message source using rdkafka.
//!
//! # Feature flag
//!
//! This module is gated behind the `kafka` feature flag:
//! ```toml
//! [dependencies]
//! orderflow = { version = "0.1", features = ["kafka"] }
//! ```
//!
//! Auto-commit is disabled. Offsets are committed synchronously, one message
//! at a time, as `offset + 1`, on the blocking thread pool.

use crate::config::KafkaConfig;
use crate::consumer::{BrokerError, MessageSource, SourceInfo, StreamMessage};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer as _, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use std::sync::Arc;

/// A consumer group member reading one Kafka topic
pub struct KafkaSource {
    consumer: Arc<StreamConsumer>,
    info: SourceInfo,
}

impl KafkaSource {
    /// Connect to the brokers and subscribe to the configured topic
    pub fn new(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let brokers = config.brokers.join(",");
        let connection_error = |e: rdkafka::error::KafkaError| BrokerError::Connection {
            brokers: brokers.clone(),
            message: e.to_string(),
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .create()
            .map_err(connection_error)?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(connection_error)?;

        Ok(Self {
            consumer: Arc::new(consumer),
            info: SourceInfo {
                brokers: brokers.clone(),
                topic: config.topic.clone(),
                group_id: config.group_id.clone(),
            },
        })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn next_message(&self) -> Result<StreamMessage, BrokerError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BrokerError::Fetch {
                message: e.to_string(),
            })?;

        Ok(StreamMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn commit(&self, message: &StreamMessage) -> Result<(), BrokerError> {
        let commit_error = |e: rdkafka::error::KafkaError| BrokerError::Commit {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            message: e.to_string(),
        };

        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(commit_error)?;

        // A synchronous commit waits on the broker, keep it off the async workers
        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || consumer.commit(&offsets, CommitMode::Sync))
            .await
            .map_err(|e| BrokerError::Commit {
                topic: message.topic.clone(),
                partition: message.partition,
                offset: message.offset,
                message: e.to_string(),
            })?
            .map_err(commit_error)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.consumer.unsubscribe();
        tracing::debug!(topic = %self.info.topic, "Kafka consumer unsubscribed");
        Ok(())
    }

    fn info(&self) -> SourceInfo {
        self.info.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_does_not_need_a_reachable_broker() {
        let config = KafkaConfig {
            brokers: vec!["127.0.0.1:1".to_string(), "127.0.0.1:2".to_string()],
            topic: "orders".to_string(),
            group_id: "orderflow".to_string(),
            session_timeout_ms: 6000,
        };

        let source = KafkaSource::new(&config).unwrap();
        let info = source.info();
        assert_eq!(info.brokers, "127.0.0.1:1,127.0.0.1:2");
        assert_eq!(info.topic, "orders");
        assert_eq!(info.group_id, "orderflow");
    }
}
