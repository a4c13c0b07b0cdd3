use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::store::{CacheError, CacheStore};
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, Deadline};

// ============================================================================
// Redis Cache Store
// ============================================================================
//
// One multiplexed connection shared by every request; redis-rs pipelines
// concurrent commands over it, so no pool or application lock is needed.
// Every call runs under a deadline and a circuit breaker.
//
// ============================================================================

pub struct RedisCache {
    connection: MultiplexedConnection,
    deadline: Deadline,
    circuit_breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
}

impl RedisCache {
    pub async fn connect(
        redis_url: &str,
        call_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let deadline = Deadline::new(call_timeout);

        let connection = deadline
            .run(client.get_multiplexed_async_connection())
            .await
            .map_err(|e| CacheError::Timeout(e.0))??;

        tracing::info!(redis_url = %redis_url, "Connected to Redis cache");

        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            open_for: Duration::from_secs(15),
            success_threshold: 2,
        };

        Ok(Self {
            connection,
            deadline,
            circuit_breaker: CircuitBreaker::new("redis-cache", cb_config),
            metrics,
        })
    }

    async fn guarded<F, T>(&self, operation: F) -> Result<T, CacheError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        let deadline = self.deadline;
        let result = self
            .circuit_breaker
            .call(async move {
                match deadline.run(operation).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(CacheError::Backend(e)),
                    Err(elapsed) => Err(CacheError::Timeout(elapsed.0)),
                }
            })
            .await;

        self.metrics
            .update_circuit_breaker_state(self.circuit_breaker.state());

        match result {
            Ok(value) => Ok(value),
            Err(CircuitBreakerError::CircuitOpen) => Err(CacheError::CircuitOpen),
            Err(CircuitBreakerError::OperationFailed(e)) => Err(e),
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut connection = self.connection.clone();
        self.guarded(async move { connection.get::<_, Option<String>>(key).await })
            .await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        // SETEX rejects a zero expiry.
        let seconds = ttl.as_secs().max(1);
        self.guarded(async move { connection.set_ex::<_, _, ()>(key, value, seconds).await })
            .await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
