//! Cache-aside read service
//!
//! [`CachedOrderService`] answers order lookups from the cache when it can and
//! falls back to the repository on a miss, repopulating the cache with the
//! default TTL. A cached value of an unexpected shape is evicted and treated
//! as a miss.

use crate::cache::{Cache, Ttl};
use crate::core::error::{OrderError, OrderflowResult, StorageError};
use crate::core::order::Order;
use crate::storage::{OrderRepository, Persisted};
use async_trait::async_trait;
use std::sync::Arc;

/// Order lookups and writes as seen by the HTTP layer and start-up code
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Fetch one order, or `OrderError::NotFound`
    async fn get_order(&self, order_uid: &str) -> OrderflowResult<Order>;

    /// Persist an order and cache it when it was newly written
    async fn create_order(&self, order: &Order) -> OrderflowResult<Persisted>;

    /// Load every stored order into the cache, returning how many were cached
    async fn load_all(&self) -> OrderflowResult<usize>;
}

/// [`OrderService`] combining a repository with a cache
#[derive(Clone)]
pub struct CachedOrderService {
    repository: Arc<dyn OrderRepository>,
    cache: Arc<dyn Cache>,
}

impl CachedOrderService {
    pub fn new(repository: Arc<dyn OrderRepository>, cache: Arc<dyn Cache>) -> Self {
        Self { repository, cache }
    }

    fn cached(&self, order_uid: &str) -> Option<Order> {
        let value = self.cache.get(order_uid)?;
        match value.downcast::<Order>() {
            Ok(order) => Some(Order::clone(&order)),
            Err(_) => {
                tracing::warn!(order_uid, "Unexpected value type in cache, evicting entry");
                self.cache.delete(order_uid);
                None
            }
        }
    }

    fn remember(&self, order: &Order) {
        self.cache
            .set(&order.order_uid, Arc::new(order.clone()), Ttl::Default);
    }
}

#[async_trait]
impl OrderService for CachedOrderService {
    async fn get_order(&self, order_uid: &str) -> OrderflowResult<Order> {
        if let Some(order) = self.cached(order_uid) {
            tracing::debug!(order_uid, "Order served from cache");
            return Ok(order);
        }

        match self.repository.get_by_uid(order_uid).await {
            Ok(order) => {
                self.remember(&order);
                tracing::debug!(order_uid, "Order loaded from storage and cached");
                Ok(order)
            }
            Err(StorageError::NotFound { .. }) => Err(OrderError::NotFound {
                order_uid: order_uid.to_string(),
            }
            .into()),
            Err(e) => {
                tracing::error!(order_uid, error = %e, "Failed to load order");
                Err(e.into())
            }
        }
    }

    async fn create_order(&self, order: &Order) -> OrderflowResult<Persisted> {
        let outcome = self.repository.create_order(order).await?;
        if outcome.is_created() {
            self.remember(order);
        }
        Ok(outcome)
    }

    async fn load_all(&self) -> OrderflowResult<usize> {
        let orders = self.repository.get_all().await?;
        for order in &orders {
            self.remember(order);
        }
        tracing::info!(count = orders.len(), "Cache warmed up from storage");
        Ok(orders.len())
    }
}
