use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Domain Models
// ============================================================================

/// The three entity kinds that are cached independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Product,
    Order,
    PromoCode,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Order => "order",
            EntityKind::PromoCode => "promo_code",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub category: String,
}

/// A persisted order line. `price` is the unit price captured from the
/// catalog inside the placement transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct OrderItem {
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Order {
    pub id: i64,
    pub coupon_code: Option<String>,
    pub items: Vec<OrderItem>,
    pub final_price: Decimal,
}

impl Order {
    /// Sum of `price * quantity` over the items.
    pub fn items_total(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.price * Decimal::from(item.quantity))
            .sum()
    }
}

/// Memoized promo verdict.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PromoCode {
    pub code: String,
    pub is_valid: bool,
    pub checked_at: DateTime<Utc>,
}

impl PromoCode {
    pub fn new(code: impl Into<String>, is_valid: bool) -> Self {
        Self {
            code: code.into(),
            is_valid,
            checked_at: Utc::now(),
        }
    }
}

// ============================================================================
// Placement Request
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct OrderRequest {
    #[serde(default)]
    pub coupon_code: Option<String>,
    pub items: Vec<OrderLine>,
}

/// One requested line. A client-supplied `price` is accepted on the wire but
/// never read by the placement path.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderLine {
    pub product_id: i64,
    pub quantity: i32,
    #[serde(default)]
    pub price: Option<Decimal>,
}

impl OrderLine {
    pub fn new(product_id: i64, quantity: i32) -> Self {
        Self {
            product_id,
            quantity,
            price: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("order must contain at least one item")]
    EmptyItems,

    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: i64, quantity: i32 },
}

impl OrderRequest {
    pub fn new(coupon_code: Option<String>, items: Vec<OrderLine>) -> Self {
        Self { coupon_code, items }
    }

    /// Coupon code with blank values treated as absent.
    pub fn coupon(&self) -> Option<&str> {
        self.coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.items.is_empty() {
            return Err(RequestError::EmptyItems);
        }
        for line in &self.items {
            if line.quantity <= 0 {
                return Err(RequestError::InvalidQuantity {
                    product_id: line.product_id,
                    quantity: line.quantity,
                });
            }
        }
        Ok(())
    }
}
