//! Order persistence
//!
//! The [`OrderRepository`] trait is the seam between the pipeline, the read
//! service and durable storage. Backends are selected by feature flag:
//!
//! - always available: [`InMemoryOrderRepository`]
//! - `postgres`: [`PostgresOrderRepository`]

use crate::core::error::StorageError;
use crate::core::order::Order;
use async_trait::async_trait;

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryOrderRepository;
#[cfg(feature = "postgres")]
pub use postgres::PostgresOrderRepository;

/// Outcome of a successful [`OrderRepository::create_order`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    /// The aggregate was written by this call
    Created,
    /// An order with the same `order_uid` already existed; nothing was written
    AlreadyExists,
}

impl Persisted {
    pub fn is_created(&self) -> bool {
        matches!(self, Persisted::Created)
    }
}

/// Durable storage for order aggregates
///
/// Implementations must write the whole aggregate atomically: either the
/// order, its delivery, its payment and all of its items are stored, or
/// nothing is. A uniqueness conflict on `order_uid` is reported as
/// [`Persisted::AlreadyExists`], never as an error.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist a validated order
    async fn create_order(&self, order: &Order) -> Result<Persisted, StorageError>;

    /// Fetch one order, or [`StorageError::NotFound`]
    async fn get_by_uid(&self, order_uid: &str) -> Result<Order, StorageError>;

    /// Fetch every stored order
    async fn get_all(&self) -> Result<Vec<Order>, StorageError>;
}
