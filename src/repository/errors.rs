use std::time::Duration;

use crate::models::EntityKind;
use crate::store::StoreError;

// ============================================================================
// Repository Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i64 },

    #[error("failed to {operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

/// Failures of the placement transaction. Every variant except `Commit`
/// means the transaction was rolled back and nothing was persisted; a
/// `Commit` failure carries whatever the store reported for the COMMIT.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("failed to start transaction: {0}")]
    TransactionStart(#[source] StoreError),

    #[error("failed to insert order: {0}")]
    HeaderInsert(#[source] StoreError),

    #[error("product {product_id} does not exist (order {order_id})")]
    ProductNotFound { order_id: i64, product_id: i64 },

    #[error("failed to fetch price for product {product_id} (order {order_id}): {source}")]
    PriceLookup {
        order_id: i64,
        product_id: i64,
        #[source]
        source: StoreError,
    },

    #[error("failed to insert item for product {product_id} (order {order_id}): {source}")]
    ItemInsert {
        order_id: i64,
        product_id: i64,
        #[source]
        source: StoreError,
    },

    #[error("failed to update final price for order {order_id}: {source}")]
    FinalPriceUpdate {
        order_id: i64,
        #[source]
        source: StoreError,
    },

    #[error("failed to commit order {order_id}: {source}")]
    Commit {
        order_id: i64,
        #[source]
        source: StoreError,
    },

    #[error("order placement exceeded {0:?}")]
    DeadlineExceeded(Duration),
}

impl OrderError {
    /// Metric label for the step that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            OrderError::TransactionStart(_) => "begin",
            OrderError::HeaderInsert(_) => "insert_order",
            OrderError::ProductNotFound { .. } => "missing_product",
            OrderError::PriceLookup { .. } => "price_lookup",
            OrderError::ItemInsert { .. } => "insert_item",
            OrderError::FinalPriceUpdate { .. } => "final_price",
            OrderError::Commit { .. } => "commit",
            OrderError::DeadlineExceeded(_) => "deadline",
        }
    }
}
