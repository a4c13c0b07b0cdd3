// ============================================================================
// Cache Layer - lookaside cache for products, orders and promo verdicts
// ============================================================================
//
// - store/   raw key/value contract (`CacheStore`) and its error type
// - redis_cache/ Redis backend (shared multiplexed connection)
// - memory/  in-process backend with per-key expiry
// - entity/  typed per-entity view with key scheme and TTL
//
// ============================================================================

mod entity;
mod memory;
mod redis_cache;
mod store;

pub use entity::{CacheableEntity, EntityCache, OrderCache, ProductCache, PromoCodeCache};
pub use memory::{MemoryCache, MemoryCacheStats};
pub use redis_cache::RedisCache;
pub use store::{CacheError, CacheStore};

#[cfg(test)]
pub(crate) use store::UnavailableCache;
