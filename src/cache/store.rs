use async_trait::async_trait;
use std::time::Duration;

// ============================================================================
// Cache Store - raw key/value contract
// ============================================================================
//
// `get` distinguishes "key absent" (`Ok(None)`) from a transport failure
// (`Err`). Callers above the repository layer never see either; both become
// a fallback to the persistent store.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("cache round-trip exceeded {0:?}")]
    Timeout(Duration),

    #[error("cache circuit breaker is open")]
    CircuitOpen,

    #[error("cached value for {key} could not be decoded: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("value for {key} could not be encoded: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Backend name used in logs.
    fn backend_name(&self) -> &'static str;
}

/// Backend that fails every call, for exercising the fallback paths.
#[cfg(test)]
pub(crate) struct UnavailableCache;

#[cfg(test)]
#[async_trait]
impl CacheStore for UnavailableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::CircuitOpen)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::CircuitOpen)
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }
}
