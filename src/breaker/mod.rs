//! Circuit breaking for degraded downstream dependencies.

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState};
