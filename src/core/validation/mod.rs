//! Order validation
//!
//! Validation runs two passes over an [`Order`] and always runs both:
//!
//! 1. **Structural** checks declared on the aggregate with `validator`
//!    attributes: presence, length bounds, currency, RFC3339 date, e-mail and
//!    phone shape, numeric ranges.
//! 2. **Business** checks tying the parts of the aggregate together: payment
//!    totals, transaction id, per-item discounts and track numbers.
//!
//! All violations are collected into a single [`ValidationError`], structural
//! ones first (sorted by field path), then business ones in a fixed order.

use crate::core::error::{FieldValidationError, ValidationError};
use crate::core::order::Order;
use std::borrow::Cow;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Stateless validator for inbound orders
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderValidator;

impl OrderValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate an order, reporting every violation at once
    pub fn validate(&self, order: &Order) -> Result<(), ValidationError> {
        let mut errors = structural_errors(order);
        errors.extend(business_errors(order));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::FieldErrors(errors))
        }
    }
}

// =============================================================================
// Structural pass
// =============================================================================

fn structural_errors(order: &Order) -> Vec<FieldValidationError> {
    let mut errors = Vec::new();
    if let Err(report) = order.validate() {
        flatten(&report, "", &mut errors);
    }
    errors.sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.code.cmp(&b.code)));
    errors
}

fn flatten(report: &ValidationErrors, prefix: &str, out: &mut Vec<FieldValidationError>) {
    for (field, kind) in report.errors() {
        let path = join_path(prefix, &field.to_string());
        match kind {
            ValidationErrorsKind::Field(errors) => {
                for error in errors {
                    out.push(FieldValidationError::new(
                        path.clone(),
                        error.code.to_string(),
                        message_for(error),
                    ));
                }
            }
            ValidationErrorsKind::Struct(nested) => flatten(nested, &path, out),
            ValidationErrorsKind::List(entries) => {
                for (index, nested) in entries {
                    flatten(nested, &format!("{}[{}]", path, index), out);
                }
            }
        }
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    // Report the shard key under its wire name
    let field = if field == "shard_key" { "shardkey" } else { field };
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

/// Human-readable message for a single rule failure
fn message_for(error: &validator::ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }

    let param = |name: &str| error.params.get(name).map(|v| v.to_string());

    match &*error.code {
        "length" => {
            let empty = error
                .params
                .get("value")
                .map(is_empty_value)
                .unwrap_or(false);
            match (param("min"), param("max")) {
                (Some(_), _) if empty => "field is required".to_string(),
                (Some(min), Some(max)) => {
                    format!("field length must be between {} and {}", min, max)
                }
                (Some(min), None) => format!("field must have at least {} element(s)", min),
                (None, Some(max)) => format!("field must be at most {} characters", max),
                (None, None) => "field has an invalid length".to_string(),
            }
        }
        "range" => match (param("min"), param("max")) {
            (Some(min), Some(max)) => format!("field must be between {} and {}", min, max),
            (Some(min), None) => format!("field must be at least {}", min),
            (None, Some(max)) => format!("field must be at most {}", max),
            (None, None) => "field is out of range".to_string(),
        },
        "email" => "field must be a valid email".to_string(),
        "regex" => "field has an invalid format".to_string(),
        other => format!("field is invalid ({})", other),
    }
}

fn is_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Null => true,
        _ => false,
    }
}

// =============================================================================
// Business pass
// =============================================================================

const CONSISTENCY: &str = "consistency";

fn business_errors(order: &Order) -> Vec<FieldValidationError> {
    let mut errors = Vec::new();
    let payment = &order.payment;

    let expected_amount = payment.expected_amount();
    if i128::from(payment.amount) != expected_amount {
        errors.push(mismatch(
            "payment.amount",
            format!(
                "amount must equal goods_total + delivery_cost + custom_fee: expected {}, got {}",
                expected_amount, payment.amount
            ),
        ));
    }

    if payment.transaction != order.order_uid {
        errors.push(mismatch(
            "payment.transaction",
            format!(
                "transaction must match order_uid: expected {:?}, got {:?}",
                order.order_uid, payment.transaction
            ),
        ));
    }

    for (index, item) in order.items.iter().enumerate() {
        let expected = item.expected_total_price();
        if i128::from(item.total_price) != expected {
            errors.push(mismatch(
                format!("items[{}].total_price", index),
                format!(
                    "total_price must equal price with {}% sale applied: expected {}, got {}",
                    item.sale, expected, item.total_price
                ),
            ));
        }

        if item.track_number != order.track_number {
            errors.push(mismatch(
                format!("items[{}].track_number", index),
                format!(
                    "track_number must match the order: expected {:?}, got {:?}",
                    order.track_number, item.track_number
                ),
            ));
        }
    }

    let items_total = order.items_total();
    if i128::from(payment.goods_total) != items_total {
        errors.push(mismatch(
            "payment.goods_total",
            format!(
                "goods_total must equal the sum of item total_price: expected {}, got {}",
                items_total, payment.goods_total
            ),
        ));
    }

    errors
}

fn mismatch(field: impl Into<Cow<'static, str>>, message: String) -> FieldValidationError {
    FieldValidationError::new(field.into().into_owned(), CONSISTENCY, message)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::order::{Delivery, Item, Payment};

    pub(crate) fn valid_order() -> Order {
        Order {
            order_uid: "A1".to_string(),
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
                transaction: "A1".to_string(),
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

    fn fields(err: &ValidationError) -> Vec<&str> {
        err.field_errors().iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_valid_order_passes() {
        assert!(OrderValidator::new().validate(&valid_order()).is_ok());
    }

    #[test]
    fn test_amount_mismatch() {
        let mut order = valid_order();
        order.payment.amount = 1816;

        let err = OrderValidator::new().validate(&order).unwrap_err();
        assert_eq!(fields(&err), vec!["payment.amount"]);
        let message = &err.field_errors()[0].message;
        assert!(message.contains("expected 1817"));
        assert!(message.contains("got 1816"));
    }

    #[test]
    fn test_transaction_mismatch() {
        let mut order = valid_order();
        order.payment.transaction = "B2".to_string();

        let err = OrderValidator::new().validate(&order).unwrap_err();
        assert_eq!(fields(&err), vec!["payment.transaction"]);
    }

    #[test]
    fn test_item_total_price_mismatch() {
        let mut order = valid_order();
        order.items[0].total_price = 318;
        order.payment.goods_total = 318;
        order.payment.amount = 1818;

        let err = OrderValidator::new().validate(&order).unwrap_err();
        assert_eq!(fields(&err), vec!["items[0].total_price"]);
    }

    #[test]
    fn test_item_track_number_mismatch() {
        let mut order = valid_order();
        order.items[0].track_number = "OTHER".to_string();

        let err = OrderValidator::new().validate(&order).unwrap_err();
        assert_eq!(fields(&err), vec!["items[0].track_number"]);
    }

    #[test]
    fn test_goods_total_mismatch() {
        let mut order = valid_order();
        order.payment.goods_total = 300;
        order.payment.amount = 1800;

        let err = OrderValidator::new().validate(&order).unwrap_err();
        assert_eq!(fields(&err), vec!["payment.goods_total"]);
    }

    #[test]
    fn test_business_errors_are_reported_together() {
        let mut order = valid_order();
        order.payment.amount = 1;
        order.payment.transaction = "B2".to_string();
        order.items[0].track_number = "OTHER".to_string();

        let err = OrderValidator::new().validate(&order).unwrap_err();
        assert_eq!(
            fields(&err),
            vec![
                "payment.amount",
                "payment.transaction",
                "items[0].track_number"
            ]
        );
    }

    #[test]
    fn test_structural_errors_are_sorted_and_nested() {
        let mut order = valid_order();
        order.payment.currency = "GBP".to_string();
        order.delivery.email = "not-an-email".to_string();
        order.items[0].sale = 101;

        let err = OrderValidator::new().validate(&order).unwrap_err();
        let names = fields(&err);
        assert!(names.contains(&"delivery.email"));
        assert!(names.contains(&"payment.currency"));
        assert!(names.contains(&"items[0].sale"));

        let structural: Vec<&str> = err
            .field_errors()
            .iter()
            .filter(|e| e.code != CONSISTENCY)
            .map(|e| e.field.as_str())
            .collect();
        let mut sorted = structural.clone();
        sorted.sort();
        assert_eq!(structural, sorted);
    }

    #[test]
    fn test_rule_messages() {
        let mut order = valid_order();
        order.payment.currency = "GBP".to_string();
        order.date_created = "yesterday".to_string();
        order.delivery.email = "nope".to_string();
        order.customer_id = String::new();

        let err = OrderValidator::new().validate(&order).unwrap_err();
        let message_of = |field: &str| {
            err.field_errors()
                .iter()
                .find(|e| e.field == field)
                .map(|e| e.message.clone())
                .unwrap()
        };

        assert_eq!(
            message_of("payment.currency"),
            "field must be one of: USD EUR RUB"
        );
        assert_eq!(
            message_of("date_created"),
            "field must be a valid datetime in RFC3339 format"
        );
        assert_eq!(message_of("delivery.email"), "field must be a valid email");
        assert_eq!(message_of("customer_id"), "field is required");
    }

    #[test]
    fn test_empty_payload_reports_missing_fields() {
        let order: Order = serde_json::from_str("{}").unwrap();
        let err = OrderValidator::new().validate(&order).unwrap_err();

        assert!(err.has_field("order_uid"));
        assert!(err.has_field("items"));
        assert!(err.has_field("delivery.name"));
        assert!(err.has_field("payment.currency"));
        assert!(err.has_field("date_created"));
    }

    #[test]
    fn test_phone_shape() {
        let mut order = valid_order();
        order.delivery.phone = "+972-000-0000".to_string();

        let err = OrderValidator::new().validate(&order).unwrap_err();
        assert_eq!(fields(&err), vec!["delivery.phone"]);
        assert_eq!(err.field_errors()[0].code, "regex");
    }

    #[test]
    fn test_validation_does_not_mutate_input() {
        let order = valid_order();
        let before = order.clone();
        let _ = OrderValidator::new().validate(&order);
        assert_eq!(order, before);
    }

    #[test]
    fn test_internal_signature_is_bounded() {
        let mut order = valid_order();
        order.internal_signature = Some("s".repeat(255));
        assert!(OrderValidator::new().validate(&order).is_ok());

        order.internal_signature = Some("s".repeat(256));
        let err = OrderValidator::new().validate(&order).unwrap_err();
        assert_eq!(fields(&err), vec!["internal_signature"]);
        assert_eq!(
            err.field_errors()[0].message,
            "field must be at most 255 characters"
        );
    }

    #[test]
    fn test_request_id_is_bounded() {
        let mut order = valid_order();
        order.payment.request_id = Some("r".repeat(100));
        assert!(OrderValidator::new().validate(&order).is_ok());

        order.payment.request_id = Some("r".repeat(101));
        let err = OrderValidator::new().validate(&order).unwrap_err();
        assert_eq!(fields(&err), vec!["payment.request_id"]);
    }

    #[test]
    fn test_email_is_bounded() {
        let mut order = valid_order();
        order.delivery.email = format!("{}@{}.com", "a".repeat(60), "b".repeat(250));

        let err = OrderValidator::new().validate(&order).unwrap_err();
        assert!(err.has_field("delivery.email"));
        assert!(
            err.field_errors()
                .iter()
                .any(|e| e.field == "delivery.email" && e.code == "length")
        );
    }
}
