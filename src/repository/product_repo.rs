use std::sync::Arc;

use super::{bounded, cache_hit, RepositoryError};
use crate::cache::ProductCache;
use crate::models::{EntityKind, Product};
use crate::store::ProductStore;
use crate::utils::Deadline;

/// Catalog reads, cache-aside.
pub struct ProductRepository {
    store: Arc<dyn ProductStore>,
    cache: ProductCache,
    deadline: Deadline,
}

impl ProductRepository {
    pub fn new(store: Arc<dyn ProductStore>, cache: ProductCache, deadline: Deadline) -> Self {
        Self {
            store,
            cache,
            deadline,
        }
    }

    pub async fn get_all(&self) -> Result<Vec<Product>, RepositoryError> {
        let cached = self.cache.get_all().await;
        if let Some(products) = cache_hit(&self.cache, ProductCache::collection_key, cached) {
            return Ok(products);
        }

        let products = bounded(
            self.deadline,
            "fetch all products",
            self.store.fetch_all_products(),
        )
        .await?;

        self.cache.populate_all(&products).await;
        Ok(products)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Product, RepositoryError> {
        let cached = self.cache.get(id).await;
        if let Some(product) = cache_hit(&self.cache, || ProductCache::key(id), cached) {
            return Ok(product);
        }

        let product = bounded(self.deadline, "fetch product", self.store.fetch_product(id))
            .await?
            .ok_or(RepositoryError::NotFound {
                kind: EntityKind::Product,
                id,
            })?;

        self.cache.populate(id, &product).await;
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, MemoryCache, UnavailableCache};
    use crate::metrics::Metrics;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;
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

    fn repository(store: MemoryStore, backend: Arc<dyn CacheStore>) -> ProductRepository {
        let metrics = Arc::new(Metrics::new().unwrap());
        let cache = ProductCache::new(backend, Duration::from_secs(600), metrics);
        ProductRepository::new(Arc::new(store), cache, Deadline::default())
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let store = catalog();
        let backend = Arc::new(MemoryCache::new());
        let repo = repository(store.clone(), backend.clone());

        let first = repo.get_by_id(1).await.unwrap();
        let second = repo.get_by_id(1).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.read_count(), 1);
        assert!(backend.contains_key("product:1").await);
    }

    #[tokio::test]
    async fn test_get_all_populates_collection_key() {
        let store = catalog();
        let backend = Arc::new(MemoryCache::new());
        let repo = repository(store.clone(), backend.clone());

        assert_eq!(repo.get_all().await.unwrap().len(), 2);
        assert_eq!(repo.get_all().await.unwrap().len(), 2);

        assert_eq!(store.read_count(), 1);
        assert!(backend.contains_key("product:all").await);
    }

    #[tokio::test]
    async fn test_missing_product_is_not_found() {
        let repo = repository(catalog(), Arc::new(MemoryCache::new()));

        let err = repo.get_by_id(404).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::NotFound { kind: EntityKind::Product, id: 404 }
        ));
    }

    #[tokio::test]
    async fn test_unavailable_cache_falls_back_to_store() {
        let store = catalog();
        let repo = repository(store.clone(), Arc::new(UnavailableCache));

        assert_eq!(repo.get_by_id(2).await.unwrap().name, "Tiramisu");
        assert_eq!(repo.get_all().await.unwrap().len(), 2);
        assert_eq!(store.read_count(), 2);
    }
}
