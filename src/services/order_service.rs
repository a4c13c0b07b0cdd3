use tracing::Instrument;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{Order, OrderRequest, Product};
use crate::promo::PromoValidator;
use crate::repository::{OrderRepository, ProductRepository};

// ============================================================================
// Order Service
// ============================================================================
//
// Orchestrates: Request → Product checks → Promo vote → Placement transaction
//
// Everything before the transaction is a read; nothing is written until every
// product reference and the coupon have been accepted.
//
// ============================================================================

pub struct OrderService {
    products: ProductRepository,
    orders: OrderRepository,
    promo: PromoValidator,
}

impl OrderService {
    pub fn new(products: ProductRepository, orders: OrderRepository, promo: PromoValidator) -> Self {
        Self {
            products,
            orders,
            promo,
        }
    }

    pub async fn place_order(&self, request: &OrderRequest) -> Result<Order, ServiceError> {
        let correlation_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "place_order",
            correlation_id = %correlation_id,
            items = request.items.len()
        );

        self.place_order_inner(request).instrument(span).await
    }

    async fn place_order_inner(&self, request: &OrderRequest) -> Result<Order, ServiceError> {
        request.validate()?;

        for line in &request.items {
            if !self.orders.check_product_exists(line.product_id).await? {
                tracing::warn!(product_id = line.product_id, "Order references unknown product");
                return Err(ServiceError::Validation(format!(
                    "product {} does not exist",
                    line.product_id
                )));
            }
        }

        if let Some(code) = request.coupon() {
            if !self.promo.validate(code).await? {
                tracing::warn!(code = %code, "Order rejected: invalid coupon");
                return Err(ServiceError::Validation("invalid coupon".to_string()));
            }
        }

        Ok(self.orders.place_order(request).await?)
    }

    pub async fn get_order(&self, id: i64) -> Result<Order, ServiceError> {
        Ok(self.orders.get_by_id(id).await?)
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, ServiceError> {
        Ok(self.orders.get_all().await?)
    }

    pub async fn get_product(&self, id: i64) -> Result<Product, ServiceError> {
        Ok(self.products.get_by_id(id).await?)
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, ServiceError> {
        Ok(self.products.get_all().await?)
    }

    /// Standalone coupon check, same path as placement uses.
    pub async fn validate_promo(&self, code: &str) -> Result<bool, ServiceError> {
        Ok(self.promo.validate(code).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, OrderCache, ProductCache, PromoCodeCache};
    use crate::error::ErrorKind;
    use crate::metrics::Metrics;
    use crate::models::{EntityKind, OrderLine};
    use crate::promo::{FileSource, ListSource, PromoSource};
    use crate::store::{MemoryStore, OrderStore};
    use crate::utils::Deadline;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::time::Duration;

    fn product(id: i64, name: &str, cents: i64) -> Product {
        Product {
            id,
            name: name.to_string(),
            price: Decimal::new(cents, 2),
            category: "Food".to_string(),
        }
    }

    fn service_with_sources(store: MemoryStore, sources: Vec<Arc<dyn PromoSource>>) -> OrderService {
        let cache = Arc::new(MemoryCache::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let ttl = Duration::from_secs(600);
        let store = Arc::new(store);

        let products = ProductRepository::new(
            store.clone(),
            ProductCache::new(cache.clone(), ttl, metrics.clone()),
            Deadline::default(),
        );
        let orders = OrderRepository::new(
            store,
            OrderCache::new(cache.clone(), ttl, metrics.clone()),
            Deadline::default(),
            metrics.clone(),
        );
        let promo = PromoValidator::new(
            sources,
            2,
            PromoCodeCache::new(cache, Duration::from_secs(86_400), metrics.clone()),
            Deadline::default(),
            metrics,
        )
        .unwrap();

        OrderService::new(products, orders, promo)
    }

    fn service(store: MemoryStore) -> OrderService {
        service_with_sources(
            store,
            vec![
                Arc::new(ListSource::new("couponbase1.txt", ["PROMO1234"])),
                Arc::new(ListSource::new("couponbase2.txt", ["LONELY123"])),
                Arc::new(ListSource::new("couponbase3.txt", ["PROMO1234"])),
            ],
        )
    }

    fn catalog() -> MemoryStore {
        MemoryStore::with_products([
            product(1, "Margherita", 1000),
            product(2, "Tiramisu", 500),
        ])
    }

    #[tokio::test]
    async fn test_place_order_end_to_end() {
        let store = catalog();
        let service = service(store.clone());

        let request = OrderRequest::new(
            Some("PROMO1234".to_string()),
            vec![OrderLine::new(1, 2), OrderLine::new(2, 1)],
        );
        let order = service.place_order(&request).await.unwrap();

        assert_eq!(order.final_price, Decimal::new(2500, 2));
        assert_eq!(order.coupon_code.as_deref(), Some("PROMO1234"));
        assert_eq!(service.get_order(order.id).await.unwrap(), order);
        assert_eq!(service.list_orders().await.unwrap(), vec![order]);
    }

    #[tokio::test]
    async fn test_unknown_product_is_rejected_before_writing() {
        let store = catalog();
        let service = service(store.clone());

        let request = OrderRequest::new(None, vec![OrderLine::new(1, 1), OrderLine::new(77, 1)]);
        let err = service.place_order(&request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.public_message(), "product 77 does not exist");
        assert!(store.fetch_all_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_coupon_is_rejected_before_writing() {
        let store = catalog();
        let service = service(store.clone());

        for code in ["LONELY123", "SHORT"] {
            let request = OrderRequest::new(Some(code.to_string()), vec![OrderLine::new(1, 1)]);
            let err = service.place_order(&request).await.unwrap_err();
            assert_eq!(err.public_message(), "invalid coupon");
        }
        assert!(store.fetch_all_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_coupon_skips_validation() {
        let service = service(catalog());

        let request = OrderRequest::new(Some("  ".to_string()), vec![OrderLine::new(2, 4)]);
        let order = service.place_order(&request).await.unwrap();

        assert_eq!(order.coupon_code, None);
        assert_eq!(order.final_price, Decimal::new(2000, 2));
    }

    #[tokio::test]
    async fn test_malformed_request_is_a_validation_error() {
        let service = service(catalog());

        let empty = service.place_order(&OrderRequest::new(None, vec![])).await.unwrap_err();
        assert_eq!(empty.status_code(), 400);

        let zero = OrderRequest::new(None, vec![OrderLine::new(1, 0)]);
        assert_eq!(service.place_order(&zero).await.unwrap_err().status_code(), 400);
    }

    #[tokio::test]
    async fn test_unreadable_promo_source_is_503() {
        let dir = tempfile::tempdir().unwrap();
        let sources = FileSource::from_dir(dir.path(), &["couponbase1.txt", "couponbase2.txt"])
            .into_iter()
            .map(|s| Arc::new(s) as Arc<dyn PromoSource>)
            .collect();
        let service = service_with_sources(catalog(), sources);

        let request = OrderRequest::new(Some("PROMO1234".to_string()), vec![OrderLine::new(1, 1)]);
        let err = service.place_order(&request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
        assert_eq!(err.status_code(), 503);
    }

    #[tokio::test]
    async fn test_lookups_map_not_found() {
        let service = service(catalog());

        assert_eq!(service.list_products().await.unwrap().len(), 2);
        assert_eq!(service.get_product(2).await.unwrap().name, "Tiramisu");

        let err = service.get_product(9).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::NotFound { kind: EntityKind::Product, id: 9 }
        ));
        assert_eq!(service.get_order(9).await.unwrap_err().status_code(), 404);
    }

    #[tokio::test]
    async fn test_validate_promo_memoizes() {
        let service = service(catalog());
        assert!(service.validate_promo("PROMO1234").await.unwrap());
        assert!(!service.validate_promo("LONELY123").await.unwrap());
        assert!(service.validate_promo("PROMO1234").await.unwrap());
    }
}
