//! HTTP API tests using axum-test

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::*;
use orderflow::prelude::*;
use serde_json::Value;
use std::time::Duration;

async fn create_test_server() -> (TestServer, CountingRepository) {
    let repo = CountingRepository::new();
    repo.inner().create_order(&fixture_order()).await.unwrap();

    let cache = TtlCache::new(Duration::from_secs(60));
    let service = Arc::new(CachedOrderService::new(
        Arc::new(repo.clone()),
        Arc::new(cache),
    ));
    let app = build_router(service, Duration::from_secs(4));
    let server = TestServer::new(app).expect("Failed to create test server");
    (server, repo)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _) = create_test_server().await;

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_get_order() {
    let (server, _) = create_test_server().await;

    let response = server.get("/orders/A1").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["order_uid"], "A1");
    assert_eq!(body["shardkey"], "9");
    assert_eq!(body["payment"]["amount"], 1817);
    assert_eq!(body["items"][0]["total_price"], 317);
    assert_eq!(body["date_created"], "2021-11-26T06:22:19Z");

    let order: Order = response.json();
    assert_eq!(order, fixture_order());
}

#[tokio::test]
async fn test_repeated_get_uses_cache() {
    let (server, repo) = create_test_server().await;

    server.get("/orders/A1").await.assert_status_ok();
    server.get("/orders/A1").await.assert_status_ok();

    assert_eq!(repo.gets(), 1);
}

#[tokio::test]
async fn test_unknown_order_is_404() {
    let (server, _) = create_test_server().await;

    let response = server.get("/orders/missing").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let body: Value = response.json();
    assert_eq!(body["code"], "ORDER_NOT_FOUND");
    assert_eq!(body["details"]["order_uid"], "missing");
}

#[tokio::test]
async fn test_missing_uid_is_400() {
    let (server, _) = create_test_server().await;

    let response = server.get("/orders").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["code"], "MISSING_PARAMETER");
}

#[tokio::test]
async fn test_overlong_uid_is_400() {
    let (server, repo) = create_test_server().await;

    let response = server.get(&format!("/orders/{}", "x".repeat(101))).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_PARAMETER");
    assert_eq!(repo.gets(), 0);
}

#[tokio::test]
async fn test_storage_failure_is_500() {
    let (server, repo) = create_test_server().await;
    repo.set_failing(true);

    let response = server.get("/orders/A1").await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = response.json();
    assert_eq!(body["code"], "STORAGE_UNAVAILABLE");
    assert_eq!(body["message"], "internal server error");
}
