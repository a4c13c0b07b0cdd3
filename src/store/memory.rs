use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{OrderStore, OrderTransaction, ProductStore, StoreError};
use crate::models::{Order, OrderItem, Product};

// ============================================================================
// In-Memory Store
// ============================================================================
//
// Same contract as the PostgreSQL store:
// - order ids come from a sequence that is never rolled back
// - a transaction stages its writes and publishes them under one lock on
//   commit; dropping it discards them
// - price lookups inside a transaction read committed catalog state
//
// ============================================================================

#[derive(Default)]
struct Tables {
    products: BTreeMap<i64, Product>,
    orders: BTreeMap<i64, OrderHeader>,
    items: Vec<OrderItem>,
}

#[derive(Clone)]
struct OrderHeader {
    id: i64,
    coupon_code: Option<String>,
    final_price: Decimal,
}

impl Tables {
    fn assemble(&self, header: &OrderHeader) -> Order {
        Order {
            id: header.id,
            coupon_code: header.coupon_code.clone(),
            items: self
                .items
                .iter()
                .filter(|item| item.order_id == header.id)
                .cloned()
                .collect(),
            final_price: header.final_price,
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    order_sequence: Arc<AtomicI64>,
    reads: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let mut tables = Tables::default();
        for product in products {
            tables.products.insert(product.id, product);
        }
        Self {
            tables: Arc::new(Mutex::new(tables)),
            ..Self::default()
        }
    }

    pub async fn upsert_product(&self, product: Product) {
        self.tables.lock().await.products.insert(product.id, product);
    }

    pub async fn remove_product(&self, id: i64) {
        self.tables.lock().await.products.remove(&id);
    }

    /// Number of non-transactional reads served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn count_read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn fetch_all_products(&self) -> Result<Vec<Product>, StoreError> {
        self.count_read();
        Ok(self.tables.lock().await.products.values().cloned().collect())
    }

    async fn fetch_product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        self.count_read();
        Ok(self.tables.lock().await.products.get(&id).cloned())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn fetch_all_orders(&self) -> Result<Vec<Order>, StoreError> {
        self.count_read();
        let tables = self.tables.lock().await;
        Ok(tables.orders.values().map(|header| tables.assemble(header)).collect())
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        self.count_read();
        let tables = self.tables.lock().await;
        Ok(tables.orders.get(&id).map(|header| tables.assemble(header)))
    }

    async fn product_exists(&self, product_id: i64) -> Result<bool, StoreError> {
        self.count_read();
        Ok(self.tables.lock().await.products.contains_key(&product_id))
    }

    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            tables: self.tables.clone(),
            order_sequence: self.order_sequence.clone(),
            orders: Vec::new(),
            items: Vec::new(),
            finished: false,
        }))
    }
}

// ============================================================================
// Staged Transaction
// ============================================================================

struct MemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    order_sequence: Arc<AtomicI64>,
    orders: Vec<OrderHeader>,
    items: Vec<OrderItem>,
    finished: bool,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.finished {
            Err(StoreError::TransactionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl OrderTransaction for MemoryTransaction {
    async fn insert_order(&mut self, coupon_code: Option<&str>) -> Result<i64, StoreError> {
        self.ensure_open()?;
        let id = self.order_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.orders.push(OrderHeader {
            id,
            coupon_code: coupon_code.map(str::to_string),
            final_price: Decimal::ZERO,
        });
        Ok(id)
    }

    async fn product_price(&mut self, product_id: i64) -> Result<Option<Decimal>, StoreError> {
        self.ensure_open()?;
        let tables = self.tables.lock().await;
        Ok(tables.products.get(&product_id).map(|product| product.price))
    }

    async fn insert_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        self.ensure_open()?;
        if item.quantity <= 0 {
            return Err(StoreError::Constraint(format!(
                "order_items.quantity must be positive, got {}",
                item.quantity
            )));
        }
        if !self.orders.iter().any(|order| order.id == item.order_id) {
            return Err(StoreError::Constraint(format!(
                "order_items.order_id {} references no order",
                item.order_id
            )));
        }
        if !self.tables.lock().await.products.contains_key(&item.product_id) {
            return Err(StoreError::Constraint(format!(
                "order_items.product_id {} references no product",
                item.product_id
            )));
        }
        self.items.push(item.clone());
        Ok(())
    }

    async fn set_final_price(&mut self, order_id: i64, final_price: Decimal) -> Result<(), StoreError> {
        self.ensure_open()?;
        let order = self
            .orders
            .iter_mut()
            .find(|order| order.id == order_id)
            .ok_or_else(|| StoreError::Constraint(format!("order {} does not exist", order_id)))?;
        order.final_price = final_price;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut tables = self.tables.lock().await;
        for order in self.orders.drain(..) {
            tables.orders.insert(order.id, order);
        }
        tables.items.append(&mut self.items);
        self.finished = true;
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                staged_orders = self.orders.len(),
                staged_items = self.items.len(),
                "Discarding uncommitted order transaction"
            );
        }
    }
}
