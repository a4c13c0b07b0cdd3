use rust_decimal::Decimal;
use std::sync::Arc;

use super::{bounded, cache_hit, OrderError, RepositoryError};
use crate::cache::OrderCache;
use crate::metrics::Metrics;
use crate::models::{EntityKind, Order, OrderItem, OrderRequest};
use crate::store::{OrderStore, OrderTransaction};
use crate::utils::Deadline;

// ============================================================================
// Order Repository
// ============================================================================
//
// Reads are cache-aside. Placement is one store transaction:
//
//   1. insert header (final_price = 0)  -> order id
//   2. per line: read catalog price, insert item at that price
//   3. set final_price = sum(price * quantity)
//   4. commit
//
// The deadline covers steps 1-3. Any failure there, or the deadline elapsing,
// drops the transaction handle and the store rolls back. The commit is never
// cancelled: once it is sent, its acknowledgement decides the outcome.
// After a commit the "order:all" entry is rebuilt from the store and the new
// order is written under its own key.
//
// ============================================================================

pub struct OrderRepository {
    store: Arc<dyn OrderStore>,
    cache: OrderCache,
    deadline: Deadline,
    metrics: Arc<Metrics>,
}

impl OrderRepository {
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: OrderCache,
        deadline: Deadline,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            cache,
            deadline,
            metrics,
        }
    }

    pub async fn get_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let cached = self.cache.get_all().await;
        if let Some(orders) = cache_hit(&self.cache, OrderCache::collection_key, cached) {
            return Ok(orders);
        }

        let orders = self.fetch_all_from_store().await?;
        self.cache.populate_all(&orders).await;
        Ok(orders)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Order, RepositoryError> {
        let cached = self.cache.get(id).await;
        if let Some(order) = cache_hit(&self.cache, || OrderCache::key(id), cached) {
            return Ok(order);
        }

        let order = bounded(self.deadline, "fetch order", self.store.fetch_order(id))
            .await?
            .ok_or(RepositoryError::NotFound {
                kind: EntityKind::Order,
                id,
            })?;

        self.cache.populate(id, &order).await;
        Ok(order)
    }

    /// Existence probe used before placement. Always hits the store.
    pub async fn check_product_exists(&self, product_id: i64) -> Result<bool, RepositoryError> {
        bounded(
            self.deadline,
            "check product existence",
            self.store.product_exists(product_id),
        )
        .await
    }

    pub async fn place_order(&self, request: &OrderRequest) -> Result<Order, OrderError> {
        let order = match self.write_order(request).await {
            Ok(order) => order,
            Err(e) => {
                self.metrics.record_placement_failure(e.stage());
                tracing::error!(
                    stage = e.stage(),
                    error = %e,
                    "❌ Order placement failed"
                );
                return Err(e);
            }
        };

        self.metrics.record_order_placed();
        tracing::info!(
            order_id = order.id,
            items = order.items.len(),
            final_price = %order.final_price,
            "✅ Order placed"
        );

        self.refresh_order_cache(&order).await;
        Ok(order)
    }

    async fn write_order(&self, request: &OrderRequest) -> Result<Order, OrderError> {
        let (mut tx, order) = match self.deadline.run(self.stage_order(request)).await {
            Ok(staged) => staged?,
            Err(elapsed) => return Err(OrderError::DeadlineExceeded(elapsed.0)),
        };

        tx.commit().await.map_err(|source| OrderError::Commit {
            order_id: order.id,
            source,
        })?;

        Ok(order)
    }

    /// Steps 1-3 on a fresh transaction, returned uncommitted.
    async fn stage_order(
        &self,
        request: &OrderRequest,
    ) -> Result<(Box<dyn OrderTransaction>, Order), OrderError> {
        let mut tx = self.store.begin().await.map_err(OrderError::TransactionStart)?;

        let coupon_code = request.coupon();
        let order_id = tx
            .insert_order(coupon_code)
            .await
            .map_err(OrderError::HeaderInsert)?;

        let mut items = Vec::with_capacity(request.items.len());
        let mut final_price = Decimal::ZERO;

        for line in &request.items {
            let product_id = line.product_id;
            let price = tx
                .product_price(product_id)
                .await
                .map_err(|source| OrderError::PriceLookup {
                    order_id,
                    product_id,
                    source,
                })?
                .ok_or(OrderError::ProductNotFound {
                    order_id,
                    product_id,
                })?;

            let item = OrderItem {
                order_id,
                product_id,
                quantity: line.quantity,
                price,
            };
            tx.insert_item(&item)
                .await
                .map_err(|source| OrderError::ItemInsert {
                    order_id,
                    product_id,
                    source,
                })?;

            final_price += price * Decimal::from(line.quantity);
            items.push(item);
        }

        tx.set_final_price(order_id, final_price)
            .await
            .map_err(|source| OrderError::FinalPriceUpdate { order_id, source })?;

        let order = Order {
            id: order_id,
            coupon_code: coupon_code.map(str::to_string),
            items,
            final_price,
        };
        Ok((tx, order))
    }

    async fn refresh_order_cache(&self, order: &Order) {
        match self.fetch_all_from_store().await {
            Ok(orders) => self.cache.populate_all(&orders).await,
            Err(e) => tracing::warn!(
                order_id = order.id,
                error = %e,
                "Could not refresh cached order list after placement"
            ),
        }
        self.cache.populate(order.id, order).await;
    }

    async fn fetch_all_from_store(&self) -> Result<Vec<Order>, RepositoryError> {
        bounded(self.deadline, "fetch all orders", self.store.fetch_all_orders()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, MemoryCache, UnavailableCache};
    use crate::models::{OrderLine, Product};
    use crate::store::{MemoryStore, OrderTransaction, StoreError};
    use async_trait::async_trait;
    use std::time::Duration;

    fn catalog() -> MemoryStore {
        MemoryStore::with_products([
            Product {
                id: 1,
                name: "Margherita".to_string(),
                price: Decimal::new(1000, 2),
                category: "Pizza".to_string(),
            },
            Product {
                id: 2,
                name: "Tiramisu".to_string(),
                price: Decimal::new(500, 2),
                category: "Dessert".to_string(),
            },
        ])
    }

    fn repository_with(
        store: Arc<dyn OrderStore>,
        backend: Arc<dyn CacheStore>,
        deadline: Deadline,
    ) -> (OrderRepository, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new().unwrap());
        let cache = OrderCache::new(backend, Duration::from_secs(600), metrics.clone());
        let repo = OrderRepository::new(store, cache, deadline, metrics.clone());
        (repo, metrics)
    }

    fn repository(store: MemoryStore, backend: Arc<dyn CacheStore>) -> (OrderRepository, Arc<Metrics>) {
        repository_with(Arc::new(store), backend, Deadline::default())
    }

    fn line_with_client_price(product_id: i64, quantity: i32, price: Decimal) -> OrderLine {
        OrderLine {
            product_id,
            quantity,
            price: Some(price),
        }
    }

    #[tokio::test]
    async fn test_place_order_uses_catalog_prices() {
        let store = catalog();
        let (repo, metrics) = repository(store.clone(), Arc::new(MemoryCache::new()));

        let request = OrderRequest::new(
            Some("PROMO1234".to_string()),
            vec![
                line_with_client_price(1, 2, Decimal::new(1, 2)),
                line_with_client_price(2, 1, Decimal::new(1, 2)),
            ],
        );
        let order = repo.place_order(&request).await.unwrap();

        assert_eq!(order.final_price, Decimal::new(2500, 2));
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].price, Decimal::new(1000, 2));
        assert_eq!(order.final_price, order.items_total());

        let stored = store.fetch_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored, order);
        assert_eq!(metrics.orders_placed.get(), 1);
    }

    #[tokio::test]
    async fn test_missing_product_rolls_back_everything() {
        let store = catalog();
        let (repo, metrics) = repository(store.clone(), Arc::new(MemoryCache::new()));

        let request = OrderRequest::new(None, vec![OrderLine::new(1, 1), OrderLine::new(99, 1)]);
        let err = repo.place_order(&request).await.unwrap_err();

        assert!(matches!(err, OrderError::ProductNotFound { product_id: 99, .. }));
        assert!(store.fetch_all_orders().await.unwrap().is_empty());
        assert_eq!(
            metrics
                .order_placement_failures
                .with_label_values(&["missing_product"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_placement_prices_from_current_catalog() {
        let store = catalog();
        let (repo, _) = repository(store.clone(), Arc::new(MemoryCache::new()));

        store
            .upsert_product(Product {
                id: 1,
                name: "Margherita".to_string(),
                price: Decimal::new(1200, 2),
                category: "Pizza".to_string(),
            })
            .await;
        store.remove_product(2).await;

        let order = repo
            .place_order(&OrderRequest::new(None, vec![OrderLine::new(1, 2)]))
            .await
            .unwrap();
        assert_eq!(order.final_price, Decimal::new(2400, 2));

        let err = repo
            .place_order(&OrderRequest::new(None, vec![OrderLine::new(2, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ProductNotFound { product_id: 2, .. }));
    }

    #[tokio::test]
    async fn test_placement_refreshes_order_list_in_cache() {
        let store = catalog();
        let backend = Arc::new(MemoryCache::new());
        let (repo, _) = repository(store.clone(), backend.clone());

        assert!(repo.get_all().await.unwrap().is_empty());

        let order = repo
            .place_order(&OrderRequest::new(None, vec![OrderLine::new(2, 3)]))
            .await
            .unwrap();

        let reads_before = store.read_count();
        let all = repo.get_all().await.unwrap();
        let one = repo.get_by_id(order.id).await.unwrap();

        assert_eq!(all, vec![order.clone()]);
        assert_eq!(one, order);
        assert_eq!(store.read_count(), reads_before);
    }

    #[tokio::test]
    async fn test_get_by_id_cache_aside() {
        let store = catalog();
        let backend = Arc::new(MemoryCache::new());
        let (writer, _) = repository(store.clone(), Arc::new(UnavailableCache));
        let order = writer
            .place_order(&OrderRequest::new(None, vec![OrderLine::new(1, 1)]))
            .await
            .unwrap();

        let (repo, _) = repository(store.clone(), backend.clone());
        let reads_before = store.read_count();
        repo.get_by_id(order.id).await.unwrap();
        repo.get_by_id(order.id).await.unwrap();

        assert_eq!(store.read_count(), reads_before + 1);
        assert!(backend.contains_key(&format!("order:{}", order.id)).await);
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let (repo, _) = repository(catalog(), Arc::new(MemoryCache::new()));
        assert!(matches!(
            repo.get_by_id(12).await,
            Err(RepositoryError::NotFound { kind: EntityKind::Order, id: 12 })
        ));
    }

    #[tokio::test]
    async fn test_placement_succeeds_when_cache_is_down() {
        let store = catalog();
        let (repo, metrics) = repository(store.clone(), Arc::new(UnavailableCache));

        let order = repo
            .place_order(&OrderRequest::new(None, vec![OrderLine::new(1, 1)]))
            .await
            .unwrap();

        assert_eq!(repo.get_by_id(order.id).await.unwrap(), order);
        assert!(
            metrics
                .cache_errors
                .with_label_values(&["order", "set"])
                .get()
                >= 1
        );
    }

    #[tokio::test]
    async fn test_check_product_exists() {
        let (repo, _) = repository(catalog(), Arc::new(MemoryCache::new()));
        assert!(repo.check_product_exists(1).await.unwrap());
        assert!(!repo.check_product_exists(3).await.unwrap());
    }

    // ------------------------------------------------------------------------
    // Stores that misbehave mid-transaction
    // ------------------------------------------------------------------------

    #[derive(Clone, Copy)]
    enum Fault {
        StallOnPrice(i64),
        PanicOnPrice(i64),
        SlowCommitAck(Duration),
    }

    /// Wraps a `MemoryStore` and injects one fault into its transactions.
    struct Sabotaged {
        inner: MemoryStore,
        fault: Fault,
    }

    struct SabotagedTransaction {
        inner: Box<dyn OrderTransaction>,
        fault: Fault,
    }

    #[async_trait]
    impl OrderStore for Sabotaged {
        async fn fetch_all_orders(&self) -> Result<Vec<Order>, StoreError> {
            self.inner.fetch_all_orders().await
        }

        async fn fetch_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
            self.inner.fetch_order(id).await
        }

        async fn product_exists(&self, product_id: i64) -> Result<bool, StoreError> {
            self.inner.product_exists(product_id).await
        }

        async fn begin(&self) -> Result<Box<dyn OrderTransaction>, StoreError> {
            Ok(Box::new(SabotagedTransaction {
                inner: self.inner.begin().await?,
                fault: self.fault,
            }))
        }
    }

    #[async_trait]
    impl OrderTransaction for SabotagedTransaction {
        async fn insert_order(&mut self, coupon_code: Option<&str>) -> Result<i64, StoreError> {
            self.inner.insert_order(coupon_code).await
        }

        async fn product_price(&mut self, product_id: i64) -> Result<Option<Decimal>, StoreError> {
            match self.fault {
                Fault::PanicOnPrice(id) if id == product_id => panic!("price lookup blew up"),
                Fault::StallOnPrice(id) if id == product_id => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                _ => {}
            }
            self.inner.product_price(product_id).await
        }

        async fn insert_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
            self.inner.insert_item(item).await
        }

        async fn set_final_price(&mut self, order_id: i64, final_price: Decimal) -> Result<(), StoreError> {
            self.inner.set_final_price(order_id, final_price).await
        }

        async fn commit(&mut self) -> Result<(), StoreError> {
            self.inner.commit().await?;
            if let Fault::SlowCommitAck(delay) = self.fault {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        }
    }

    fn sabotaged(store: &MemoryStore, fault: Fault) -> Arc<Sabotaged> {
        Arc::new(Sabotaged {
            inner: store.clone(),
            fault,
        })
    }

    #[tokio::test]
    async fn test_deadline_expiry_rolls_back() {
        let store = catalog();
        let (repo, _) = repository_with(
            sabotaged(&store, Fault::StallOnPrice(2)),
            Arc::new(MemoryCache::new()),
            Deadline::new(Duration::from_millis(50)),
        );

        let request = OrderRequest::new(None, vec![OrderLine::new(1, 1), OrderLine::new(2, 1)]);
        let err = repo.place_order(&request).await.unwrap_err();

        assert!(matches!(err, OrderError::DeadlineExceeded(_)));
        assert!(store.fetch_all_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_commit_ack_is_not_reported_as_failure() {
        let store = catalog();
        let backend = Arc::new(MemoryCache::new());
        let (repo, metrics) = repository_with(
            sabotaged(&store, Fault::SlowCommitAck(Duration::from_millis(200))),
            backend.clone(),
            Deadline::new(Duration::from_millis(50)),
        );

        let request = OrderRequest::new(None, vec![OrderLine::new(1, 2)]);
        let order = repo.place_order(&request).await.unwrap();

        assert_eq!(store.fetch_all_orders().await.unwrap(), vec![order.clone()]);
        assert_eq!(metrics.orders_placed.get(), 1);
        assert!(backend.contains_key("order:all").await);
        assert!(backend.contains_key(&format!("order:{}", order.id)).await);
    }

    #[tokio::test]
    async fn test_panic_mid_transaction_rolls_back() {
        let store = catalog();
        let (repo, _) = repository_with(
            sabotaged(&store, Fault::PanicOnPrice(2)),
            Arc::new(MemoryCache::new()),
            Deadline::default(),
        );
        let repo = Arc::new(repo);

        let request = OrderRequest::new(None, vec![OrderLine::new(1, 1), OrderLine::new(2, 1)]);
        let handle = tokio::spawn({
            let repo = repo.clone();
            async move { repo.place_order(&request).await.map(|order| order.id) }
        });

        let joined = handle.await;
        assert!(joined.unwrap_err().is_panic());
        assert!(store.fetch_all_orders().await.unwrap().is_empty());
    }
}
