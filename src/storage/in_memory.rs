//! In-memory order repository for testing and development

use crate::core::error::StorageError;
use crate::core::order::Order;
use crate::storage::{OrderRepository, Persisted};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const BACKEND: &str = "memory";

/// In-memory order repository
///
/// Each call holds the lock for its whole duration, so a create is atomic
/// and the map key enforces uniqueness of `order_uid`.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl InMemoryOrderRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders
    pub fn len(&self) -> usize {
        self.orders.read().map(|orders| orders.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned(e: impl std::fmt::Display) -> StorageError {
    StorageError::Query {
        backend: BACKEND.to_string(),
        message: format!("Failed to acquire lock: {}", e),
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<Persisted, StorageError> {
        let mut orders = self.orders.write().map_err(poisoned)?;

        if orders.contains_key(&order.order_uid) {
            return Ok(Persisted::AlreadyExists);
        }
        orders.insert(order.order_uid.clone(), order.clone());

        Ok(Persisted::Created)
    }

    async fn get_by_uid(&self, order_uid: &str) -> Result<Order, StorageError> {
        let orders = self.orders.read().map_err(poisoned)?;

        orders
            .get(order_uid)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                order_uid: order_uid.to_string(),
            })
    }

    async fn get_all(&self) -> Result<Vec<Order>, StorageError> {
        let orders = self.orders.read().map_err(poisoned)?;

        let mut all: Vec<Order> = orders.values().cloned().collect();
        all.sort_by(|a, b| a.order_uid.cmp(&b.order_uid));
        Ok(all)
    }
}
