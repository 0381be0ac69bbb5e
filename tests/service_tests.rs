//! Cache-aside read service tests

mod common;

use common::*;
use orderflow::prelude::*;
use std::time::Duration;

fn service_over(repo: &CountingRepository, cache: &TtlCache) -> CachedOrderService {
    CachedOrderService::new(Arc::new(repo.clone()), Arc::new(cache.clone()))
}

async fn seeded() -> (CountingRepository, TtlCache, CachedOrderService) {
    let repo = CountingRepository::new();
    repo.inner().create_order(&fixture_order()).await.unwrap();
    let cache = TtlCache::new(Duration::from_secs(60));
    let service = service_over(&repo, &cache);
    (repo, cache, service)
}

#[tokio::test]
async fn test_miss_populates_cache() {
    let (repo, cache, service) = seeded().await;

    let order = service.get_order("A1").await.unwrap();
    assert_eq!(order, fixture_order());
    assert_eq!(repo.gets(), 1);

    let cached = cache.get("A1").unwrap().downcast::<Order>().unwrap();
    assert_eq!(*cached, order);
}

#[tokio::test]
async fn test_hit_skips_storage() {
    let (repo, _cache, service) = seeded().await;

    let first = service.get_order("A1").await.unwrap();
    let second = service.get_order("A1").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(repo.gets(), 1);
}

#[tokio::test]
async fn test_not_found_is_typed() {
    let (repo, cache, service) = seeded().await;

    let err = service.get_order("missing").await.unwrap_err();
    assert!(matches!(err, OrderflowError::Order(OrderError::NotFound { .. })));
    assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    assert_eq!(repo.gets(), 1);
    assert!(cache.get("missing").is_none());
}

#[tokio::test]
async fn test_unexpected_cached_shape_is_evicted() {
    let (repo, cache, service) = seeded().await;
    cache.set("A1", Arc::new("not an order".to_string()), Ttl::Default);

    let order = service.get_order("A1").await.unwrap();
    assert_eq!(order.order_uid, "A1");
    assert_eq!(repo.gets(), 1);

    // The foreign value was replaced by the fetched order
    assert!(cache.get("A1").unwrap().downcast::<Order>().is_ok());
}

#[tokio::test]
async fn test_storage_failure_propagates() {
    let (repo, cache, service) = seeded().await;
    repo.set_failing(true);

    let err = service.get_order("A1").await.unwrap_err();
    assert!(matches!(err, OrderflowError::Storage(_)));
    assert_eq!(
        err.status_code(),
        axum::http::StatusCode::INTERNAL_SERVER_ERROR
    );
    assert!(cache.get("A1").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_is_fetched_again() {
    let (repo, _cache, service) = seeded().await;

    service.get_order("A1").await.unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;
    service.get_order("A1").await.unwrap();

    assert_eq!(repo.gets(), 2);
}

#[tokio::test]
async fn test_create_then_get_is_served_from_cache() {
    let repo = CountingRepository::new();
    let cache = TtlCache::new(Duration::from_secs(60));
    let service = service_over(&repo, &cache);

    let outcome = service.create_order(&fixture_order()).await.unwrap();
    assert_eq!(outcome, Persisted::Created);

    service.get_order("A1").await.unwrap();
    assert_eq!(repo.gets(), 0);
}

#[tokio::test]
async fn test_warm_up_loads_everything() {
    let repo = CountingRepository::new();
    repo.inner().create_order(&fixture_order_with_uid("A1")).await.unwrap();
    repo.inner().create_order(&fixture_order_with_uid("B2")).await.unwrap();
    let cache = TtlCache::new(Duration::from_secs(60));
    let service = service_over(&repo, &cache);

    assert_eq!(service.load_all().await.unwrap(), 2);

    service.get_order("A1").await.unwrap();
    service.get_order("B2").await.unwrap();
    assert_eq!(repo.gets(), 0);
}

#[tokio::test]
async fn test_concurrent_reads() {
    let (repo, _cache, service) = seeded().await;
    let service = Arc::new(service);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let service = service.clone();
        handles.push(tokio::spawn(async move { service.get_order("A1").await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().order_uid, "A1");
    }

    // Concurrent misses may each hit storage, but never more than once per caller
    assert!(repo.gets() >= 1 && repo.gets() <= 16);
}
