//! Order aggregate: the order root and the delivery, payment and items it owns
//!
//! The same types are used for the inbound stream payload, the persisted
//! aggregate and the HTTP response body. Field names follow the wire format.
//!
//! Every struct is `#[serde(default)]` so a payload with missing fields still
//! decodes; the absent values surface as structural validation errors instead
//! of an opaque decode failure.

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::Validate;

/// Currencies a payment may be denominated in
pub const SUPPORTED_CURRENCIES: &[&str] = &["USD", "EUR", "RUB"];

/// Maximum length of an order identifier
pub const MAX_ORDER_UID_LEN: usize = 100;

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]+$").expect("phone pattern is valid"));

/// An order and everything it owns
///
/// Constructed once from an inbound message, validated, then persisted as an
/// immutable unit. There is no partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Order {
    #[validate(length(min = 1, max = 100))]
    pub order_uid: String,

    #[validate(length(min = 1, max = 100))]
    pub track_number: String,

    #[validate(length(min = 1, max = 50))]
    pub entry: String,

    #[validate(nested)]
    pub delivery: Delivery,

    #[validate(nested)]
    pub payment: Payment,

    #[validate(length(min = 1), nested)]
    pub items: Vec<Item>,

    #[validate(length(min = 2, max = 5))]
    pub locale: String,

    #[validate(length(max = 255))]
    pub internal_signature: Option<String>,

    #[validate(length(min = 1, max = 100))]
    pub customer_id: String,

    #[validate(length(min = 1, max = 50))]
    pub delivery_service: String,

    #[serde(rename = "shardkey")]
    #[validate(length(min = 1, max = 20))]
    pub shard_key: String,

    #[validate(range(min = 1))]
    pub sm_id: i64,

    #[validate(custom(function = "validate_rfc3339"))]
    pub date_created: String,

    #[validate(length(min = 1, max = 10))]
    pub oof_shard: String,
}

/// Delivery details, owned 1:1 by an order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Delivery {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(length(min = 10, max = 20), regex(path = *PHONE_PATTERN))]
    pub phone: String,

    #[validate(length(min = 5, max = 10))]
    pub zip: String,

    #[validate(length(min = 1, max = 100))]
    pub city: String,

    #[validate(length(min = 1, max = 200))]
    pub address: String,

    #[validate(length(min = 1, max = 100))]
    pub region: String,

    #[validate(email, length(max = 255))]
    pub email: String,
}

/// Payment details, owned 1:1 by an order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Payment {
    #[validate(length(min = 1, max = 100))]
    pub transaction: String,

    #[validate(length(max = 100))]
    pub request_id: Option<String>,

    #[validate(custom(function = "validate_currency"))]
    pub currency: String,

    #[validate(length(min = 1, max = 50))]
    pub provider: String,

    #[validate(range(min = 0))]
    pub amount: i64,

    #[validate(range(min = 1))]
    pub payment_dt: i64,

    #[validate(length(min = 1, max = 50))]
    pub bank: String,

    #[validate(range(min = 0))]
    pub delivery_cost: i64,

    #[validate(range(min = 0))]
    pub goods_total: i64,

    #[validate(range(min = 0))]
    pub custom_fee: i64,
}

/// A single line item of an order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Item {
    #[validate(range(min = 1))]
    pub chrt_id: i64,

    #[validate(length(min = 1, max = 100))]
    pub track_number: String,

    #[validate(range(min = 0))]
    pub price: i64,

    #[validate(length(min = 1, max = 100))]
    pub rid: String,

    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(range(min = 0, max = 100))]
    pub sale: i64,

    #[validate(length(min = 1, max = 10))]
    pub size: String,

    #[validate(range(min = 0))]
    pub total_price: i64,

    #[validate(range(min = 1))]
    pub nm_id: i64,

    #[validate(length(min = 1, max = 100))]
    pub brand: String,

    #[validate(range(min = 0))]
    pub status: i64,
}

impl Order {
    /// Parsed `date_created`, if it is a valid RFC3339 timestamp
    pub fn created_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.date_created).ok()
    }

    /// Sum of the items' `total_price`
    pub fn items_total(&self) -> i128 {
        self.items.iter().map(|item| item.total_price as i128).sum()
    }
}

impl Item {
    /// Price after applying the sale percentage
    ///
    /// The discounted price is rounded down, so a fractional discount counts
    /// as a whole unit: 453 at 30% gives 317.
    pub fn expected_total_price(&self) -> i128 {
        let price = self.price as i128;
        (price * (100 - self.sale as i128)).div_euclid(100)
    }
}

impl Payment {
    /// `goods_total + delivery_cost + custom_fee`
    pub fn expected_amount(&self) -> i128 {
        self.goods_total as i128 + self.delivery_cost as i128 + self.custom_fee as i128
    }
}

fn validate_rfc3339(value: &str) -> Result<(), validator::ValidationError> {
    if value.is_empty() {
        return Err(validator::ValidationError::new("required")
            .with_message("field is required".into()));
    }
    DateTime::parse_from_rfc3339(value).map(|_| ()).map_err(|_| {
        validator::ValidationError::new("datetime")
            .with_message("field must be a valid datetime in RFC3339 format".into())
    })
}

fn validate_currency(value: &str) -> Result<(), validator::ValidationError> {
    if SUPPORTED_CURRENCIES.contains(&value) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("oneof").with_message(
            format!("field must be one of: {}", SUPPORTED_CURRENCIES.join(" ")).into(),
        ))
    }
}
