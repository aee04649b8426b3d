//! Response caching with TTL expiry, LRU eviction, and request coalescing.

pub mod flow_cache;
pub mod key;

pub use flow_cache::{CacheStats, FlowCache};
pub use key::make_cache_key;
