//! Call-site composition of the cache and the breaker.
//!
//! [`FlowGuard`] is a higher-order adapter: the cache wraps the breaker,
//! which wraps the caller's operation. A cache hit is answered before the
//! breaker sees the call, so cached traffic cannot trip — or be rejected
//! by — an open circuit.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::breaker::{CircuitBreaker, CircuitBreakerStats};
use crate::cache::{CacheStats, FlowCache};
use crate::error::CircuitError;

/// Cache-then-breaker wrapper around a caller-supplied async operation.
///
/// Both components are shared handles, so the same cache or breaker can sit
/// behind several guards (for example one breaker gating every prompt
/// namespace).
pub struct FlowGuard<T> {
    cache: Arc<FlowCache<T>>,
    breaker: Arc<CircuitBreaker>,
}

impl<T: Clone> FlowGuard<T> {
    /// Compose an existing cache and breaker.
    pub fn new(cache: Arc<FlowCache<T>>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { cache, breaker }
    }

    /// Run `op` through the breaker, memoizing its success per
    /// `(namespace, input)`.
    ///
    /// Outcomes, in order of precedence:
    /// - cache hit — returns the cached value; the breaker is untouched;
    /// - [`CircuitError::Open`] — rejected before any downstream attempt;
    ///   nothing is cached;
    /// - [`CircuitError::Inner`] — `op` ran and failed; the error passes
    ///   through after breaker bookkeeping; nothing is cached;
    /// - success — recorded by the breaker and cached.
    pub async fn execute<F, Fut, E>(
        &self,
        namespace: &str,
        input: &Value,
        op: F,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = Arc::clone(&self.breaker);
        self.cache
            .get_or_call(namespace, input, || async move { breaker.call(op).await })
            .await
    }

    /// The shared cache handle.
    pub fn cache(&self) -> &Arc<FlowCache<T>> {
        &self.cache
    }

    /// The shared breaker handle.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Snapshot of both components, shaped for a metrics exporter.
    pub fn stats(&self) -> GuardStats {
        GuardStats {
            cache: self.cache.stats(),
            breaker: self.breaker.stats(),
        }
    }
}

impl<T> Clone for FlowGuard<T> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            breaker: Arc::clone(&self.breaker),
        }
    }
}

/// Combined stats snapshot.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GuardStats {
    pub cache: CacheStats,
    pub breaker: CircuitBreakerStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitState;
    use crate::config::{CircuitBreakerConfig, FlowCacheConfig};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::assert_ok;

    fn guard(ttl_seconds: u64, max_size: usize, failure_threshold: u32) -> FlowGuard<String> {
        let cache = Arc::new(
            FlowCache::new(FlowCacheConfig {
                ttl_seconds,
                max_size,
                enabled: true,
            })
            .unwrap(),
        );
        let breaker = Arc::new(
            CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold,
                recovery_timeout: 10.0,
                name: "llm".into(),
                ..Default::default()
            })
            .unwrap(),
        );
        FlowGuard::new(cache, breaker)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_never_touches_breaker() {
        let guard = guard(60, 2, 5);
        let calls = Arc::new(AtomicUsize::new(0));
        let input = json!({"x": 1});

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let v = guard
                .execute("f", &input, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, &str>("answer".to_string())
                })
                .await
                .unwrap();
            assert_eq!(v, "answer");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = guard.stats();
        assert_eq!(stats.cache.hits, 2);
        assert_eq!(
            stats.breaker.total_calls, 1,
            "cached traffic must not reach the breaker"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_not_cached() {
        let guard = guard(60, 8, 1);
        let input = json!({"x": 1});

        let err = guard
            .execute("f", &input, || async { Err::<String, _>("boom") })
            .await
            .unwrap_err();
        assert!(!err.is_open());

        // Circuit is now open; the same key is rejected, not served stale.
        let err = guard
            .execute("f", &input, || async { Ok::<_, &str>("late".to_string()) })
            .await
            .unwrap_err();
        assert!(err.is_open());
        assert!(guard.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_after_cooldown_repopulates_cache() {
        let guard = guard(60, 8, 1);
        let input = json!({"x": 1});

        guard
            .execute("f", &input, || async { Err::<String, _>("boom") })
            .await
            .unwrap_err();
        tokio::time::advance(std::time::Duration::from_secs(10)).await;

        let v = tokio_test::assert_ok!(
            guard
                .execute("f", &input, || async { Ok::<_, &str>("fresh".to_string()) })
                .await
        );
        assert_eq!(v, "fresh");
        assert_eq!(guard.breaker().state(), CircuitState::Closed);
        assert_eq!(guard.cache().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_serialize_for_export() {
        let guard = guard(60, 8, 5);
        let json = serde_json::to_value(guard.stats()).unwrap();
        assert_eq!(json["cache"]["max_size"], 8);
        assert_eq!(json["breaker"]["state"], "closed");
        assert_eq!(json["breaker"]["name"], "llm");
    }
}
