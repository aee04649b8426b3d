//! flowguard — response caching and circuit breaking for slow or unreliable
//! LLM backends.
//!
//! Two independent components, composable at the call site:
//!
//! - [`FlowCache`]: TTL + LRU memoization of an async operation per
//!   `(namespace, input)` pair, with per-key coalescing so concurrent
//!   callers on a cold key trigger exactly one execution.
//! - [`CircuitBreaker`]: a three-state admission gate that stops calling a
//!   failing dependency for a cooldown period, then probes for recovery.
//!
//! [`FlowGuard`] wires them together in the usual order — cache outside,
//! breaker inside — so a cache hit never touches the breaker.
//!
//! All state is process-local: in a multi-worker deployment each worker
//! holds its own cache and breaker. Neither component retries or imposes
//! timeouts; both are transparent pass-through wrappers whose only custom
//! error is [`CircuitError::Open`].
//!
//! ```rust
//! use std::sync::Arc;
//! use flowguard::{CircuitBreaker, FlowCache, FlowGuard};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let guard = FlowGuard::new(
//!     Arc::new(FlowCache::with_defaults()),
//!     Arc::new(CircuitBreaker::with_defaults("llm")),
//! );
//!
//! let summary = guard
//!     .execute("summarize", &json!({"doc": "…"}), || async {
//!         Ok::<_, std::io::Error>("a summary".to_string())
//!     })
//!     .await
//!     .unwrap();
//! assert_eq!(summary, "a summary");
//! # }
//! ```

pub mod breaker;
pub mod cache;
pub mod config;
pub mod error;
pub mod guard;

pub use breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState};
pub use cache::{make_cache_key, CacheStats, FlowCache};
pub use config::{CircuitBreakerConfig, FlowCacheConfig};
pub use error::{CircuitError, ConfigError};
pub use guard::{FlowGuard, GuardStats};
