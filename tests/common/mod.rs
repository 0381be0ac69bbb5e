//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use orderflow::core::{Delivery, Item, Order, Payment, StorageError};
use orderflow::storage::{InMemoryOrderRepository, OrderRepository, Persisted};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const TOPIC: &str = "orders";
pub const GROUP: &str = "orderflow-test";

// =============================================================================
// Orders
// =============================================================================

/// A valid order: one item at 453 with 30% off (317), 1500 delivery
pub fn fixture_order() -> Order {
    fixture_order_with_uid("A1")
}

pub fn fixture_order_with_uid(uid: &str) -> Order {
    Order {
        order_uid: uid.to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: uid.to_string(),
            request_id: None,
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: 1637907727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items: vec![Item {
            chrt_id: 9934930,
            track_number: "WBILMTESTTRACK".to_string(),
            price: 453,
            rid: "ab4219087a764ae0btest".to_string(),
            name: "Mascaras".to_string(),
            sale: 30,
            size: "0".to_string(),
            total_price: 317,
            nm_id: 2389212,
            brand: "Vivienne Sabo".to_string(),
            status: 202,
        }],
        locale: "en".to_string(),
        internal_signature: None,
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shard_key: "9".to_string(),
        sm_id: 99,
        date_created: "2021-11-26T06:22:19Z".to_string(),
        oof_shard: "1".to_string(),
    }
}

pub fn to_payload(order: &Order) -> Vec<u8> {
    serde_json::to_vec(order).unwrap()
}

// =============================================================================
// Repositories
// =============================================================================

/// Repository wrapper counting calls, optionally failing every call
#[derive(Clone)]
pub struct CountingRepository {
    inner: InMemoryOrderRepository,
    creates: Arc<AtomicUsize>,
    gets: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl CountingRepository {
    pub fn new() -> Self {
        Self {
            inner: InMemoryOrderRepository::new(),
            creates: Arc::new(AtomicUsize::new(0)),
            gets: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A repository whose every call fails with a transient error
    pub fn failing() -> Self {
        let repo = Self::new();
        repo.set_failing(true);
        repo
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> usize {
        self.inner.len()
    }

    pub fn inner(&self) -> &InMemoryOrderRepository {
        &self.inner
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                backend: "test".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for CountingRepository {
    async fn create_order(&self, order: &Order) -> Result<Persisted, StorageError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.create_order(order).await
    }

    async fn get_by_uid(&self, order_uid: &str) -> Result<Order, StorageError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get_by_uid(order_uid).await
    }

    async fn get_all(&self) -> Result<Vec<Order>, StorageError> {
        self.check()?;
        self.inner.get_all().await
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Poll `condition` every 10ms until it holds, for at most `limit`
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Run `future` with a generous timeout so a hung test fails instead of blocking
pub async fn bounded<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("operation timed out")
}
