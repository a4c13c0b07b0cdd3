use std::future::Future;
use std::time::Duration;

/// Upper bound applied to a single store or cache round-trip.
///
/// When the bound elapses the inner future is dropped, which for an open
/// transaction means it rolls back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Duration);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {0:?} exceeded")]
pub struct DeadlineExceeded(pub Duration);

impl Deadline {
    pub fn new(limit: Duration) -> Self {
        Self(limit)
    }

    pub async fn run<F, T>(&self, operation: F) -> Result<T, DeadlineExceeded>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.0, operation)
            .await
            .map_err(|_| DeadlineExceeded(self.0))
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self(Duration::from_secs(5))
    }
}
