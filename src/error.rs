use crate::models::{EntityKind, RequestError};
use crate::promo::PromoError;
use crate::repository::{OrderError, RepositoryError};

// ============================================================================
// Service Errors - what callers of the service layer see
// ============================================================================
//
//   NotFound           -> 404   entity absent from cache and store
//   Validation         -> 400   bad request, unknown product, rejected coupon
//   Store              -> 500   read or placement failure
//   SourceUnavailable  -> 503   a promo source could not be consulted
//
// Cache failures never reach this layer.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Store,
    SourceUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i64 },

    #[error("{0}")]
    Validation(String),

    #[error("store failure: {0}")]
    Store(#[source] RepositoryError),

    #[error("order placement failed: {0}")]
    Placement(#[source] OrderError),

    #[error("promo validation unavailable: {0}")]
    SourceUnavailable(#[source] PromoError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound { .. } => ErrorKind::NotFound,
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::Store(_) | ServiceError::Placement(_) => ErrorKind::Store,
            ServiceError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
        }
    }

    /// HTTP-equivalent status for transport adapters.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Validation => 400,
            ErrorKind::Store => 500,
            ErrorKind::SourceUnavailable => 503,
        }
    }

    /// Message safe to hand to a client. Carries entity ids but never driver
    /// or query text.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::NotFound { .. } | ServiceError::Validation(_) => self.to_string(),
            ServiceError::Store(RepositoryError::Store { operation, .. }) => {
                format!("failed to {operation}")
            }
            ServiceError::Store(RepositoryError::NotFound { kind, id }) => {
                format!("{kind} {id} not found")
            }
            ServiceError::Placement(e) => placement_message(e),
            ServiceError::SourceUnavailable(_) => {
                "promo code validation is temporarily unavailable".to_string()
            }
        }
    }
}

fn placement_message(error: &OrderError) -> String {
    match error {
        OrderError::PriceLookup { order_id, product_id, .. }
        | OrderError::ItemInsert { order_id, product_id, .. } => {
            format!("failed to place order {order_id} at product {product_id}")
        }
        OrderError::FinalPriceUpdate { order_id, .. } | OrderError::Commit { order_id, .. } => {
            format!("failed to place order {order_id}")
        }
        // ProductNotFound is mapped to Validation before reaching here.
        _ => "failed to place order".to_string(),
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { kind, id } => ServiceError::NotFound { kind, id },
            other => ServiceError::Store(other),
        }
    }
}

impl From<OrderError> for ServiceError {
    fn from(error: OrderError) -> Self {
        match error {
            OrderError::ProductNotFound { product_id, .. } => {
                ServiceError::Validation(format!("product {product_id} does not exist"))
            }
            other => ServiceError::Placement(other),
        }
    }
}

impl From<PromoError> for ServiceError {
    fn from(error: PromoError) -> Self {
        ServiceError::SourceUnavailable(error)
    }
}

impl From<RequestError> for ServiceError {
    fn from(error: RequestError) -> Self {
        ServiceError::Validation(error.to_string())
    }
}
