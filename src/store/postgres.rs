use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;

use super::{OrderStore, OrderTransaction, ProductStore, StoreError};
use crate::models::{Order, OrderItem, Product};

const SCHEMA: &str = include_str!("../../migrations/0001_schema.sql");

// ============================================================================
// PostgreSQL Store
// ============================================================================

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    coupon_code: Option<String>,
    final_price: Decimal,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Order {
        Order {
            id: self.id,
            coupon_code: self.coupon_code,
            items,
            final_price: self.final_price,
        }
    }
}

impl PgStore {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections = max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("Database schema ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn fetch_all_products(&self) -> Result<Vec<Product>, StoreError> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT id, name, price, category FROM products ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    async fn fetch_product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, name, price, category FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn fetch_all_orders(&self) -> Result<Vec<Order>, StoreError> {
        let headers = sqlx::query_as::<_, OrderRow>(
            "SELECT id, coupon_code, final_price FROM orders ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT order_id, product_id, quantity, price FROM order_items ORDER BY order_id, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut items_by_order: HashMap<i64, Vec<OrderItem>> = HashMap::new();
        for item in items {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(headers
            .into_iter()
            .map(|row| {
                let items = items_by_order.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect())
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let header = sqlx::query_as::<_, OrderRow>(
            "SELECT id, coupon_code, final_price FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT order_id, product_id, quantity, price FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(header.into_order(items)))
    }

    async fn product_exists(&self, product_id: i64) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx: Some(tx) }))
    }
}

// ============================================================================
// Placement Transaction
// ============================================================================

struct PgTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTransaction {
    fn connection(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.tx.as_deref_mut().ok_or(StoreError::TransactionClosed)
    }
}

#[async_trait]
impl OrderTransaction for PgTransaction {
    async fn insert_order(&mut self, coupon_code: Option<&str>) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO orders (coupon_code, final_price) VALUES ($1, 0) RETURNING id",
        )
        .bind(coupon_code)
        .fetch_one(self.connection()?)
        .await?;
        Ok(id)
    }

    async fn product_price(&mut self, product_id: i64) -> Result<Option<Decimal>, StoreError> {
        let price = sqlx::query_scalar::<_, Decimal>("SELECT price FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(self.connection()?)
            .await?;
        Ok(price)
    }

    async fn insert_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, quantity, price) VALUES ($1, $2, $3, $4)",
        )
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.price)
        .execute(self.connection()?)
        .await?;
        Ok(())
    }

    async fn set_final_price(&mut self, order_id: i64, final_price: Decimal) -> Result<(), StoreError> {
        sqlx::query("UPDATE orders SET final_price = $1 WHERE id = $2")
            .bind(final_price)
            .bind(order_id)
            .execute(self.connection()?)
            .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        // sqlx issues the ROLLBACK when the inner transaction is dropped.
        if self.tx.is_some() {
            tracing::debug!("Rolling back uncommitted order transaction");
        }
    }
}
