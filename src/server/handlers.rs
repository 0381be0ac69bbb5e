//! HTTP handlers for the order read API

use crate::core::error::{OrderflowError, RequestError};
use crate::core::order::{MAX_ORDER_UID_LEN, Order};
use crate::service::OrderService;
use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};
use std::sync::Arc;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn OrderService>,
}

const ORDER_UID: &str = "order_uid";

fn check_order_uid(order_uid: &str) -> Result<(), RequestError> {
    if order_uid.trim().is_empty() {
        return Err(RequestError::MissingParameter {
            parameter: ORDER_UID.to_string(),
        });
    }
    if order_uid.chars().count() > MAX_ORDER_UID_LEN {
        return Err(RequestError::ParameterTooLong {
            parameter: ORDER_UID.to_string(),
            max: MAX_ORDER_UID_LEN,
        });
    }
    Ok(())
}

/// `GET /orders/{order_uid}`
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> Result<Json<Order>, OrderflowError> {
    check_order_uid(&order_uid)?;
    let order = state.service.get_order(&order_uid).await?;
    Ok(Json(order))
}

/// `GET /orders` without an identifier
pub async fn missing_order_uid() -> OrderflowError {
    RequestError::MissingParameter {
        parameter: ORDER_UID.to_string(),
    }
    .into()
}

/// `GET /health`
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_order_uid() {
        assert!(check_order_uid("A1").is_ok());
        assert!(check_order_uid(&"x".repeat(MAX_ORDER_UID_LEN)).is_ok());

        assert!(matches!(
            check_order_uid(""),
            Err(RequestError::MissingParameter { .. })
        ));
        assert!(matches!(
            check_order_uid("   "),
            Err(RequestError::MissingParameter { .. })
        ));
        assert!(matches!(
            check_order_uid(&"x".repeat(MAX_ORDER_UID_LEN + 1)),
            Err(RequestError::ParameterTooLong { max: 100, .. })
        ));
    }
}
