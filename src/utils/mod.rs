pub mod circuit_breaker;
pub mod deadline;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use deadline::{Deadline, DeadlineExceeded};
