//! In-process message broker for tests and local runs
//!
//! Topics are split into partitions, each an append-only log. Consumer groups
//! track one committed offset per partition, using the Kafka convention that
//! the committed offset is the next one to read. A new [`InMemorySource`]
//! resumes from its group's committed offsets, so uncommitted messages are
//! delivered again.

use crate::consumer::{BrokerError, MessageSource, SourceInfo, StreamMessage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

const BROKERS: &str = "memory";

#[derive(Debug, Clone)]
struct StoredMessage {
    key: Option<Vec<u8>>,
    payload: Vec<u8>,
}

type GroupPartition = (String, String, i32);

#[derive(Default)]
struct BrokerInner {
    topics: Mutex<HashMap<String, Vec<Vec<StoredMessage>>>>,
    committed: Mutex<HashMap<GroupPartition, i64>>,
    published: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, BrokerError> {
    mutex.lock().map_err(|e| BrokerError::Fetch {
        message: format!("Failed to acquire broker lock: {}", e),
    })
}

/// Partitioned in-memory log shared by publishers and sources
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `topic` with `partitions` partitions if it does not exist yet
    pub fn create_topic(&self, topic: &str, partitions: usize) -> Result<(), BrokerError> {
        let mut topics = lock(&self.inner.topics)?;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions.max(1)]);
        Ok(())
    }

    /// Append a message, returning its partition and offset
    ///
    /// Keyed messages always land on the same partition; unkeyed ones go to
    /// partition 0. Unknown topics are created with a single partition.
    pub fn publish(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(i32, i64), BrokerError> {
        let position = {
            let mut topics = lock(&self.inner.topics)?;
            let partitions = topics
                .entry(topic.to_string())
                .or_insert_with(|| vec![Vec::new()]);

            let partition = match key {
                Some(key) => {
                    let mut hasher = DefaultHasher::new();
                    key.hash(&mut hasher);
                    (hasher.finish() % partitions.len() as u64) as usize
                }
                None => 0,
            };

            let log = &mut partitions[partition];
            log.push(StoredMessage {
                key: key.map(<[u8]>::to_vec),
                payload: payload.into(),
            });
            (partition as i32, log.len() as i64 - 1)
        };

        self.inner.published.notify_waiters();
        Ok(position)
    }

    /// Subscribe a consumer group member to `topic`
    pub fn subscribe(&self, topic: &str, group_id: &str) -> Result<InMemorySource, BrokerError> {
        self.create_topic(topic, 1)?;
        Ok(InMemorySource {
            broker: self.inner.clone(),
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            positions: Mutex::new(HashMap::new()),
            cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Committed offset of `group_id` on a partition, if any
    pub fn committed_offset(&self, group_id: &str, topic: &str, partition: i32) -> Option<i64> {
        let committed = lock(&self.inner.committed).ok()?;
        committed
            .get(&(group_id.to_string(), topic.to_string(), partition))
            .copied()
    }

    /// Total number of messages in `topic` across partitions
    pub fn message_count(&self, topic: &str) -> usize {
        lock(&self.inner.topics)
            .ok()
            .and_then(|topics| topics.get(topic).map(|p| p.iter().map(Vec::len).sum()))
            .unwrap_or(0)
    }
}

/// A consumer group member reading one topic from an [`InMemoryBroker`]
pub struct InMemorySource {
    broker: Arc<BrokerInner>,
    topic: String,
    group_id: String,
    /// Next offset to fetch per partition
    positions: Mutex<HashMap<i32, i64>>,
    /// Partition to look at first on the next poll
    cursor: AtomicUsize,
    closed: AtomicBool,
}

impl InMemorySource {
    fn poll(&self) -> Result<Option<StreamMessage>, BrokerError> {
        let topics = lock(&self.broker.topics)?;
        let Some(partitions) = topics.get(&self.topic) else {
            return Ok(None);
        };
        let committed = lock(&self.broker.committed)?;
        let mut positions = lock(&self.positions)?;

        let count = partitions.len();
        let start = self.cursor.load(Ordering::Relaxed) % count;
        for step in 0..count {
            let partition = (start + step) % count;
            let id = partition as i32;
            let position = *positions.entry(id).or_insert_with(|| {
                committed
                    .get(&(self.group_id.clone(), self.topic.clone(), id))
                    .copied()
                    .unwrap_or(0)
            });

            if let Some(stored) = partitions[partition].get(position as usize) {
                positions.insert(id, position + 1);
                self.cursor.store(partition + 1, Ordering::Relaxed);
                return Ok(Some(StreamMessage {
                    topic: self.topic.clone(),
                    partition: id,
                    offset: position,
                    key: stored.key.clone(),
                    payload: stored.payload.clone(),
                }));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn next_message(&self) -> Result<StreamMessage, BrokerError> {
        loop {
            // Register interest before checking so a concurrent publish is not missed
            let notified = self.broker.published.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.closed.load(Ordering::Acquire) {
                return Err(BrokerError::Closed);
            }
            if let Some(message) = self.poll()? {
                return Ok(message);
            }

            notified.await;
        }
    }

    async fn commit(&self, message: &StreamMessage) -> Result<(), BrokerError> {
        let mut committed = lock(&self.broker.committed).map_err(|e| BrokerError::Commit {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            message: e.to_string(),
        })?;
        committed.insert(
            (self.group_id.clone(), message.topic.clone(), message.partition),
            message.offset + 1,
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.store(true, Ordering::Release);
        self.broker.published.notify_waiters();
        Ok(())
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            brokers: BROKERS.to_string(),
            topic: self.topic.clone(),
            group_id: self.group_id.clone(),
        }
    }
}
