//! Per-message handling: decode, validate, persist

use crate::consumer::retry::{RetryError, RetryPolicy};
use crate::consumer::StreamMessage;
use crate::core::error::{StorageError, ValidationError};
use crate::core::order::Order;
use crate::core::validation::OrderValidator;
use crate::storage::{OrderRepository, Persisted};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a message was handled; every outcome means the offset can be committed
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The order was written
    Persisted { order_uid: String },
    /// The order already existed; nothing was written
    Duplicate { order_uid: String },
    /// The message can never be handled and is skipped
    Rejected(Rejection),
}

/// Why a message was skipped
#[derive(Debug)]
pub enum Rejection {
    /// The payload is not an order document
    Decode(ValidationError),
    /// The order violates one or more rules
    Validation {
        order_uid: String,
        error: ValidationError,
    },
    /// The store refuses the order in a way no retry can fix
    Storage {
        order_uid: String,
        error: StorageError,
    },
}

/// A message that was not handled; its offset must not be committed
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Shutdown was requested during the write or while waiting to retry it
    #[error("processing of {topic}[{partition}]@{offset} cancelled after {attempts} attempt(s)")]
    Cancelled {
        topic: String,
        partition: i32,
        offset: i64,
        attempts: u32,
    },

    /// The retry budget ran out
    #[error("failed to persist order '{order_uid}' after {attempts} attempt(s): {source}")]
    Exhausted {
        order_uid: String,
        attempts: u32,
        #[source]
        source: StorageError,
    },
}

impl ProcessError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProcessError::Cancelled { .. })
    }
}

/// Handles one message at a time
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(
        &self,
        message: &StreamMessage,
        shutdown: &CancellationToken,
    ) -> Result<ProcessOutcome, ProcessError>;
}

/// Decodes orders, validates them and writes them with retries
#[derive(Clone)]
pub struct OrderMessageProcessor {
    repository: Arc<dyn OrderRepository>,
    validator: OrderValidator,
    retry: RetryPolicy,
}

impl OrderMessageProcessor {
    pub fn new(repository: Arc<dyn OrderRepository>, retry: RetryPolicy) -> Self {
        Self {
            repository,
            validator: OrderValidator::new(),
            retry,
        }
    }

    /// Decode and validate a payload without touching storage
    pub fn parse(&self, payload: &[u8]) -> Result<Order, Rejection> {
        let order: Order = serde_json::from_slice(payload)
            .map_err(|e| Rejection::Decode(ValidationError::from(e)))?;

        self.validator
            .validate(&order)
            .map_err(|error| Rejection::Validation {
                order_uid: order.order_uid.clone(),
                error,
            })?;

        Ok(order)
    }
}

#[async_trait]
impl MessageProcessor for OrderMessageProcessor {
    async fn process(
        &self,
        message: &StreamMessage,
        shutdown: &CancellationToken,
    ) -> Result<ProcessOutcome, ProcessError> {
        let order = match self.parse(&message.payload) {
            Ok(order) => order,
            Err(Rejection::Decode(error)) => {
                tracing::error!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %error,
                    "Failed to decode message, skipping"
                );
                return Ok(ProcessOutcome::Rejected(Rejection::Decode(error)));
            }
            Err(Rejection::Validation { order_uid, error }) => {
                tracing::error!(
                    order_uid = %order_uid,
                    partition = message.partition,
                    offset = message.offset,
                    error = %error,
                    "Order validation failed, skipping"
                );
                return Ok(ProcessOutcome::Rejected(Rejection::Validation {
                    order_uid,
                    error,
                }));
            }
            // `parse` never touches storage, so this arm is unreachable
            Err(rejection @ Rejection::Storage { .. }) => {
                return Ok(ProcessOutcome::Rejected(rejection));
            }
        };

        let repository = &self.repository;
        let pending = &order;
        // Permanent refusals end the retry loop as a successful attempt
        let written = self
            .retry
            .run(shutdown, move |_| async move {
                match repository.create_order(pending).await {
                    Err(e) if !e.is_transient() => Ok(Err(e)),
                    other => other.map(Ok),
                }
            })
            .await;

        match written {
            Ok(Ok(Persisted::Created)) => {
                tracing::info!(
                    order_uid = %order.order_uid,
                    partition = message.partition,
                    offset = message.offset,
                    "Order persisted"
                );
                Ok(ProcessOutcome::Persisted {
                    order_uid: order.order_uid,
                })
            }
            Ok(Ok(Persisted::AlreadyExists)) => {
                tracing::info!(order_uid = %order.order_uid, "Order already exists, skipping");
                Ok(ProcessOutcome::Duplicate {
                    order_uid: order.order_uid,
                })
            }
            Ok(Err(error)) => {
                tracing::error!(
                    order_uid = %order.order_uid,
                    partition = message.partition,
                    offset = message.offset,
                    error = %error,
                    "Order refused by storage, skipping"
                );
                Ok(ProcessOutcome::Rejected(Rejection::Storage {
                    order_uid: order.order_uid,
                    error,
                }))
            }
            Err(RetryError::Cancelled {
                attempts,
                last_error,
            }) => {
                tracing::warn!(
                    order_uid = %order.order_uid,
                    attempts,
                    error = last_error.as_ref().map(tracing::field::display),
                    "Shutdown requested while persisting, leaving message uncommitted"
                );
                Err(ProcessError::Cancelled {
                    topic: message.topic.clone(),
                    partition: message.partition,
                    offset: message.offset,
                    attempts,
                })
            }
            Err(RetryError::Exhausted { attempts, last_error }) => {
                tracing::error!(
                    order_uid = %order.order_uid,
                    attempts,
                    error = %last_error,
                    "Giving up on order"
                );
                Err(ProcessError::Exhausted {
                    order_uid: order.order_uid,
                    attempts,
                    source: last_error,
                })
            }
        }
    }
}
