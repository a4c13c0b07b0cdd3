// ============================================================================
// Persistent Store - relational source of truth
// ============================================================================
//
// Two capability traits, one per repository, plus the transaction handle the
// order write path runs inside. Backends:
// - postgres/  sqlx + PostgreSQL
// - memory/    in-process tables with staged transactional writes
//
// Transaction contract: a handle that is dropped without a successful
// `commit` rolls back. Early returns, deadline expiry and panics all take
// that path exactly once.
//
// ============================================================================

mod memory;
mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{Order, OrderItem, Product};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("transaction already finished")]
    TransactionClosed,

    #[error("store call exceeded {0:?}")]
    Timeout(std::time::Duration),
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn fetch_all_products(&self) -> Result<Vec<Product>, StoreError>;

    async fn fetch_product(&self, id: i64) -> Result<Option<Product>, StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Orders with their line items, ordered by id.
    async fn fetch_all_orders(&self) -> Result<Vec<Order>, StoreError>;

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, StoreError>;

    async fn product_exists(&self, product_id: i64) -> Result<bool, StoreError>;

    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, StoreError>;
}

/// Statements of the placement transaction.
#[async_trait]
pub trait OrderTransaction: Send {
    /// Insert the header with a zero final price; returns the assigned id.
    async fn insert_order(&mut self, coupon_code: Option<&str>) -> Result<i64, StoreError>;

    /// Authoritative unit price, read inside the transaction.
    async fn product_price(&mut self, product_id: i64) -> Result<Option<Decimal>, StoreError>;

    async fn insert_item(&mut self, item: &OrderItem) -> Result<(), StoreError>;

    async fn set_final_price(&mut self, order_id: i64, final_price: Decimal) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;
}
