//! Router for the order read API

use crate::server::handlers::{AppState, get_order, health_check, missing_order_uid};
use crate::service::OrderService;
use axum::http::StatusCode;
use axum::{Router, routing::get};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the application router
///
/// Routes:
/// - GET /orders/{order_uid} - Fetch one order
/// - GET /orders - Rejected, the identifier is required
/// - GET /health - Liveness probe
pub fn build_router(service: Arc<dyn OrderService>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/orders/{order_uid}", get(get_order))
        .route("/orders", get(missing_order_uid))
        .route("/orders/", get(missing_order_uid))
        .route("/health", get(health_check))
        .with_state(AppState { service })
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
}
