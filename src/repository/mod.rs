// ============================================================================
// Repositories - cache-aside reads and the transactional order write path
// ============================================================================
//
// Cache failures stop here: they are logged, counted and treated as misses.
// Store failures propagate, wrapped with the operation that failed.
//
// ============================================================================

pub mod errors;
pub mod order_repo;
pub mod product_repo;

use std::future::Future;

use crate::cache::{CacheError, CacheableEntity, EntityCache};
use crate::store::StoreError;
use crate::utils::Deadline;

pub use errors::{OrderError, RepositoryError};
pub use order_repo::OrderRepository;
pub use product_repo::ProductRepository;

/// Run one store call under the repository deadline.
async fn bounded<T, F>(deadline: Deadline, operation: &'static str, call: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let source = match deadline.run(call).await {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => e,
        Err(elapsed) => StoreError::Timeout(elapsed.0),
    };
    Err(RepositoryError::Store { operation, source })
}

/// Collapse a cache read into hit-or-miss, absorbing failures.
fn cache_hit<T, E: CacheableEntity>(
    cache: &EntityCache<E>,
    key: impl FnOnce() -> String,
    lookup: Result<Option<T>, CacheError>,
) -> Option<T> {
    match lookup {
        Ok(found) => found,
        Err(e) => {
            cache.absorb("get", &key(), &e);
            None
        }
    }
}
