//! # orderflow
//!
//! Idempotent order ingestion from a partitioned message stream, with a
//! cache-aside read API over the stored orders.
//!
//! ## Features
//!
//! - **Ingestion pipeline**: decode, validate, persist with retries, commit
//! - **At-least-once safe**: a redelivered order is a no-op, never a duplicate
//! - **Atomic writes**: an order and its delivery, payment and items are stored together
//! - **Cache-aside reads**: TTL cache in front of storage, warmed up on start
//! - **Pluggable backends**: in-memory or PostgreSQL storage, in-memory or Kafka source
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use orderflow::prelude::*;
//!
//! let repository: Arc<dyn OrderRepository> = Arc::new(InMemoryOrderRepository::new());
//! let cache = Arc::new(TtlCache::new(Duration::from_secs(300)));
//! let service = Arc::new(CachedOrderService::new(repository.clone(), cache));
//!
//! let broker = InMemoryBroker::new();
//! let source = Arc::new(broker.subscribe("orders", "orderflow")?);
//! let processor = Arc::new(OrderMessageProcessor::new(repository, RetryPolicy::default()));
//! let mut consumer = OrderConsumer::new(source, processor);
//!
//! let shutdown = CancellationToken::new();
//! tokio::spawn(async move { consumer.run(shutdown).await });
//!
//! let app = build_router(service, Duration::from_secs(4));
//! ```

pub mod cache;
pub mod config;
pub mod consumer;
pub mod core;
pub mod logging;
pub mod server;
pub mod service;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        Delivery, FieldValidationError, Item, Order, OrderError, OrderValidator, OrderflowError,
        OrderflowResult, Payment, StorageError, ValidationError,
    };

    // === Storage ===
    pub use crate::storage::{InMemoryOrderRepository, OrderRepository, Persisted};
    #[cfg(feature = "postgres")]
    pub use crate::storage::PostgresOrderRepository;

    // === Cache & Service ===
    pub use crate::cache::{Cache, CacheValue, Ttl, TtlCache};
    pub use crate::service::{CachedOrderService, OrderService};

    // === Consumer ===
    pub use crate::consumer::{
        Consumer, ConsumerState, InMemoryBroker, MessageProcessor, MessageSource,
        OrderConsumer, OrderMessageProcessor, RetryPolicy, StreamMessage,
    };
    #[cfg(feature = "kafka")]
    pub use crate::consumer::KafkaSource;

    // === Config & Server ===
    pub use crate::config::{AppConfig, Environment};
    pub use crate::server::build_router;

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
    pub use std::time::Duration;
    pub use tokio_util::sync::CancellationToken;
}
