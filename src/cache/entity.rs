use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use super::store::{CacheError, CacheStore};
use crate::metrics::Metrics;
use crate::models::{EntityKind, Order, Product, PromoCode};

// ============================================================================
// Typed Entity Cache
// ============================================================================
//
// One `EntityCache<E>` per entity kind. It owns the key scheme and the TTL
// for that kind and speaks in entities, not strings:
//
//   point lookup:   "<kind>:<id>"     e.g. "product:42", "promo_code:PROMO1234"
//   whole kind:     "<kind>:all"      e.g. "order:all"
//
// Ids are integers or 8-10 character codes, so they never collide with the
// "all" sentinel.
//
// ============================================================================

/// Marker for types stored through `EntityCache`.
pub trait CacheableEntity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;
}

impl CacheableEntity for Product {
    const KIND: EntityKind = EntityKind::Product;
}

impl CacheableEntity for Order {
    const KIND: EntityKind = EntityKind::Order;
}

impl CacheableEntity for PromoCode {
    const KIND: EntityKind = EntityKind::PromoCode;
}

pub type ProductCache = EntityCache<Product>;
pub type OrderCache = EntityCache<Order>;
pub type PromoCodeCache = EntityCache<PromoCode>;

pub struct EntityCache<E: CacheableEntity> {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    metrics: Arc<Metrics>,
    _phantom: PhantomData<fn() -> E>,
}

impl<E: CacheableEntity> EntityCache<E> {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            ttl,
            metrics,
            _phantom: PhantomData,
        }
    }

    pub fn key(id: impl Display) -> String {
        format!("{}:{}", E::KIND.as_str(), id)
    }

    pub fn collection_key() -> String {
        format!("{}:all", E::KIND.as_str())
    }

    pub async fn get(&self, id: impl Display) -> Result<Option<E>, CacheError> {
        self.read(&Self::key(id)).await
    }

    pub async fn get_all(&self) -> Result<Option<Vec<E>>, CacheError> {
        self.read(&Self::collection_key()).await
    }

    pub async fn set(&self, id: impl Display, entity: &E) -> Result<(), CacheError> {
        self.write(&Self::key(id), entity).await
    }

    pub async fn set_all(&self, entities: &[E]) -> Result<(), CacheError> {
        self.write(&Self::collection_key(), entities).await
    }

    /// Fire-and-forget population: a failed write is logged and counted,
    /// never returned.
    pub async fn populate(&self, id: impl Display, entity: &E) {
        let key = Self::key(id);
        if let Err(e) = self.write(&key, entity).await {
            self.absorb("set", &key, &e);
        }
    }

    pub async fn populate_all(&self, entities: &[E]) {
        let key = Self::collection_key();
        if let Err(e) = self.write(&key, entities).await {
            self.absorb("set", &key, &e);
        }
    }

    /// Log and count a cache failure that the caller is about to ignore.
    pub fn absorb(&self, operation: &str, key: &str, error: &CacheError) {
        let kind = E::KIND;
        self.metrics.record_cache_error(kind, operation);
        tracing::warn!(
            entity = %kind,
            key = %key,
            operation = operation,
            backend = self.store.backend_name(),
            error = %error,
            "Cache operation failed, continuing without cache"
        );
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let Some(raw) = self.store.get(key).await? else {
            self.metrics.record_cache_miss(E::KIND);
            tracing::debug!(key = %key, "Cache miss");
            return Ok(None);
        };

        let value = serde_json::from_str(&raw).map_err(|source| CacheError::Decode {
            key: key.to_string(),
            source,
        })?;
        self.metrics.record_cache_hit(E::KIND);
        tracing::debug!(key = %key, "Cache hit");
        Ok(Some(value))
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value).map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, payload, self.ttl).await
    }
}
