//! PostgreSQL order repository using sqlx.
//!
//! # Feature flag
//!
//! This module is gated behind the `postgres` feature flag:
//! ```toml
//! [dependencies]
//! orderflow = { version = "0.1", features = ["postgres"] }
//! ```
//!
//! # Schema
//!
//! The aggregate is normalized over four tables. `orders` references its
//! `delivery` and `payment` rows, `items` reference their order, and
//! `orders.order_uid` carries the uniqueness constraint that makes ingestion
//! idempotent. `date_created` is stored as `TIMESTAMPTZ` and rendered back as
//! RFC3339 in UTC.

use crate::core::error::StorageError;
use crate::core::order::{Delivery, Item, Order, Payment};
use crate::storage::{OrderRepository, Persisted};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;

const BACKEND: &str = "PostgreSQL";

/// Name of the uniqueness constraint on `orders.order_uid`
pub const ORDER_UID_CONSTRAINT: &str = "orders_order_uid_key";

// ---------------------------------------------------------------------------
// Schema management
// ---------------------------------------------------------------------------

/// Apply the required tables and indexes (idempotent).
///
/// This creates:
/// - `delivery` and `payment` tables
/// - `orders` table with the unique `order_uid` constraint
/// - `items` table indexed by order
///
/// Safe to call on every startup.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StorageError> {
    let statements = [
        (
            "delivery",
            "CREATE TABLE IF NOT EXISTS delivery (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                phone VARCHAR(20) NOT NULL,
                zip VARCHAR(10) NOT NULL,
                city VARCHAR(100) NOT NULL,
                address VARCHAR(200) NOT NULL,
                region VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL
            )",
        ),
        (
            "payment",
            "CREATE TABLE IF NOT EXISTS payment (
                id BIGSERIAL PRIMARY KEY,
                transaction VARCHAR(100) NOT NULL,
                request_id VARCHAR(100) NULL,
                currency VARCHAR(3) NOT NULL,
                provider VARCHAR(50) NOT NULL,
                amount BIGINT NOT NULL,
                payment_dt BIGINT NOT NULL,
                bank VARCHAR(50) NOT NULL,
                delivery_cost BIGINT NOT NULL,
                goods_total BIGINT NOT NULL,
                custom_fee BIGINT NOT NULL
            )",
        ),
        (
            "orders",
            "CREATE TABLE IF NOT EXISTS orders (
                id BIGSERIAL PRIMARY KEY,
                order_uid VARCHAR(100) NOT NULL,
                track_number VARCHAR(100) NOT NULL,
                entry VARCHAR(50) NOT NULL,
                locale VARCHAR(5) NOT NULL,
                internal_signature VARCHAR(255) NULL,
                customer_id VARCHAR(100) NOT NULL,
                delivery_service VARCHAR(50) NOT NULL,
                shardkey VARCHAR(20) NOT NULL,
                sm_id BIGINT NOT NULL,
                date_created TIMESTAMPTZ NOT NULL,
                oof_shard VARCHAR(10) NOT NULL,
                delivery_id BIGINT NOT NULL REFERENCES delivery(id),
                payment_id BIGINT NOT NULL REFERENCES payment(id),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT orders_order_uid_key UNIQUE (order_uid)
            )",
        ),
        (
            "items",
            "CREATE TABLE IF NOT EXISTS items (
                id BIGSERIAL PRIMARY KEY,
                order_id BIGINT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
                chrt_id BIGINT NOT NULL,
                track_number VARCHAR(100) NOT NULL,
                price BIGINT NOT NULL,
                rid VARCHAR(100) NOT NULL,
                name VARCHAR(200) NOT NULL,
                sale BIGINT NOT NULL,
                size VARCHAR(10) NOT NULL,
                total_price BIGINT NOT NULL,
                nm_id BIGINT NOT NULL,
                brand VARCHAR(100) NOT NULL,
                status BIGINT NOT NULL
            )",
        ),
        (
            "items index",
            "CREATE INDEX IF NOT EXISTS idx_items_order_id ON items (order_id)",
        ),
    ];

    for (table, sql) in statements {
        sqlx::query(sql)
            .execute(pool)
            .await
            .map_err(|e| query_error(&format!("Failed to create {}", table), e))?;
    }

    Ok(())
}

fn query_error(context: &str, e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageError::Connection {
                backend: BACKEND.to_string(),
                message: format!("{}: {}", context, e),
            }
        }
        _ => StorageError::Query {
            backend: BACKEND.to_string(),
            message: format!("{}: {}", context, e),
        },
    }
}

fn tx_error(context: &str, e: sqlx::Error) -> StorageError {
    StorageError::Transaction {
        message: format!("{}: {}", context, e),
    }
}

/// True when the store refuses the data itself: SQLSTATE class 22 (data
/// exception) or 23 (integrity violation). Retrying the same order cannot help.
fn is_data_rejection(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| code.starts_with("22") || code.starts_with("23")),
        sqlx::Error::Encode(_) => true,
        _ => false,
    }
}

fn write_error(context: &str, e: sqlx::Error) -> StorageError {
    if is_data_rejection(&e) {
        StorageError::Integrity {
            message: format!("{}: {}", context, e),
        }
    } else {
        query_error(context, e)
    }
}

/// True when `e` is the uniqueness violation on `orders.order_uid`
fn is_duplicate_order(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() && db.constraint() == Some(ORDER_UID_CONSTRAINT)
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Order repository backed by PostgreSQL.
#[derive(Clone, Debug)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Create a new `PostgresOrderRepository` with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_aggregate(
        tx: &mut Transaction<'static, Postgres>,
        order: &Order,
    ) -> Result<(), sqlx::Error> {
        let delivery = &order.delivery;
        let delivery_id: i64 = sqlx::query_scalar(
            "INSERT INTO delivery (name, phone, zip, city, address, region, email) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(&delivery.name)
        .bind(&delivery.phone)
        .bind(&delivery.zip)
        .bind(&delivery.city)
        .bind(&delivery.address)
        .bind(&delivery.region)
        .bind(&delivery.email)
        .fetch_one(&mut **tx)
        .await?;

        let payment = &order.payment;
        let payment_id: i64 = sqlx::query_scalar(
            "INSERT INTO payment (transaction, request_id, currency, provider, amount, payment_dt, \
             bank, delivery_cost, goods_total, custom_fee) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING id",
        )
        .bind(&payment.transaction)
        .bind(&payment.request_id)
        .bind(&payment.currency)
        .bind(&payment.provider)
        .bind(payment.amount)
        .bind(payment.payment_dt)
        .bind(&payment.bank)
        .bind(payment.delivery_cost)
        .bind(payment.goods_total)
        .bind(payment.custom_fee)
        .fetch_one(&mut **tx)
        .await?;

        let date_created = DateTime::parse_from_rfc3339(&order.date_created)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let order_id: i64 = sqlx::query_scalar(
            "INSERT INTO orders (order_uid, track_number, entry, locale, internal_signature, \
             customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard, \
             delivery_id, payment_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING id",
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shard_key)
        .bind(order.sm_id)
        .bind(date_created)
        .bind(&order.oof_shard)
        .bind(delivery_id)
        .bind(payment_id)
        .fetch_one(&mut **tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO items (order_id, chrt_id, track_number, price, rid, name, sale, \
                 size, total_price, nm_id, brand, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(order_id)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    async fn items_by_order(&self, order_ids: &[i64]) -> Result<HashMap<i64, Vec<Item>>, StorageError> {
        let rows = sqlx::query(
            "SELECT order_id, chrt_id, track_number, price, rid, name, sale, size, \
             total_price, nm_id, brand, status \
             FROM items WHERE order_id = ANY($1) ORDER BY id",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to load items", e))?;

        let mut grouped: HashMap<i64, Vec<Item>> = HashMap::new();
        for row in rows {
            let order_id: i64 = row
                .try_get("order_id")
                .map_err(|e| query_error("Failed to decode item", e))?;
            let item = item_from_row(&row).map_err(|e| query_error("Failed to decode item", e))?;
            grouped.entry(order_id).or_default().push(item);
        }
        Ok(grouped)
    }
}

const ORDER_SELECT: &str = "SELECT o.id, o.order_uid, o.track_number, o.entry, o.locale, \
     o.internal_signature, o.customer_id, o.delivery_service, o.shardkey, o.sm_id, \
     o.date_created, o.oof_shard, \
     d.name AS d_name, d.phone, d.zip, d.city, d.address, d.region, d.email, \
     p.transaction, p.request_id, p.currency, p.provider, p.amount, p.payment_dt, p.bank, \
     p.delivery_cost, p.goods_total, p.custom_fee \
     FROM orders o \
     JOIN delivery d ON d.id = o.delivery_id \
     JOIN payment p ON p.id = o.payment_id";

fn order_from_row(row: &PgRow) -> Result<(i64, Order), sqlx::Error> {
    let date_created: DateTime<Utc> = row.try_get("date_created")?;

    let order = Order {
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        delivery: Delivery {
            name: row.try_get("d_name")?,
            phone: row.try_get("phone")?,
            zip: row.try_get("zip")?,
            city: row.try_get("city")?,
            address: row.try_get("address")?,
            region: row.try_get("region")?,
            email: row.try_get("email")?,
        },
        payment: Payment {
            transaction: row.try_get("transaction")?,
            request_id: row.try_get("request_id")?,
            currency: row.try_get("currency")?,
            provider: row.try_get("provider")?,
            amount: row.try_get("amount")?,
            payment_dt: row.try_get("payment_dt")?,
            bank: row.try_get("bank")?,
            delivery_cost: row.try_get("delivery_cost")?,
            goods_total: row.try_get("goods_total")?,
            custom_fee: row.try_get("custom_fee")?,
        },
        items: Vec::new(),
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        customer_id: row.try_get("customer_id")?,
        delivery_service: row.try_get("delivery_service")?,
        shard_key: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created: date_created.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        oof_shard: row.try_get("oof_shard")?,
    };

    Ok((row.try_get("id")?, order))
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
    })
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<Persisted, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| tx_error("Failed to begin transaction", e))?;

        match Self::insert_aggregate(&mut tx, order).await {
            Ok(()) => {}
            Err(e) if is_duplicate_order(&e) => {
                tx.rollback()
                    .await
                    .map_err(|e| tx_error("Failed to roll back transaction", e))?;
                tracing::debug!(order_uid = %order.order_uid, "Order already exists");
                return Ok(Persisted::AlreadyExists);
            }
            Err(e) => {
                // Dropping the transaction rolls it back
                return Err(write_error("Failed to create order", e));
            }
        }

        tx.commit()
            .await
            .map_err(|e| tx_error("Failed to commit transaction", e))?;

        tracing::debug!(
            order_uid = %order.order_uid,
            items = order.items.len(),
            "Order persisted"
        );
        Ok(Persisted::Created)
    }

    async fn get_by_uid(&self, order_uid: &str) -> Result<Order, StorageError> {
        let row = sqlx::query(&format!("{} WHERE o.order_uid = $1", ORDER_SELECT))
            .bind(order_uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error("Failed to get order", e))?;

        let row = row.ok_or_else(|| StorageError::NotFound {
            order_uid: order_uid.to_string(),
        })?;
        let (id, mut order) =
            order_from_row(&row).map_err(|e| query_error("Failed to decode order", e))?;

        let mut items = self.items_by_order(&[id]).await?;
        order.items = items.remove(&id).unwrap_or_default();
        Ok(order)
    }

    async fn get_all(&self) -> Result<Vec<Order>, StorageError> {
        let rows = sqlx::query(&format!("{} ORDER BY o.id", ORDER_SELECT))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_error("Failed to list orders", e))?;

        let orders = rows
            .iter()
            .map(order_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| query_error("Failed to decode order", e))?;

        let ids: Vec<i64> = orders.iter().map(|(id, _)| *id).collect();
        let mut items = self.items_by_order(&ids).await?;

        Ok(orders
            .into_iter()
            .map(|(id, mut order)| {
                order.items = items.remove(&id).unwrap_or_default();
                order
            })
            .collect())
    }
}
