//! TTL + LRU response cache with per-key request coalescing.
//!
//! Memoizes the outcome of an expensive async operation per
//! `(namespace, input)` pair. Two lock scopes, by design:
//!
//! - a per-key `tokio::sync::Mutex` held across the wrapped call, so K
//!   concurrent callers on a cold key collapse into exactly one execution;
//! - a short-lived `std::sync::Mutex` guarding only container mutation,
//!   never held across an await.
//!
//! Failed attempts are never cached; the wrapped operation's error
//! propagates unchanged.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::key::make_cache_key;
use crate::config::FlowCacheConfig;
use crate::error::ConfigError;

/// A single cached result.
struct CacheEntry<T> {
    value: T,
    /// Monotonic creation time; drives TTL expiry.
    created_at: Instant,
    /// Monotonic access tick; drives LRU ordering. Ticks are unique, so
    /// eviction order is deterministic even when two touches share a
    /// timestamp.
    last_access: u64,
}

/// Entries plus counters, guarded together by one short-lived mutex.
struct CacheStore<T> {
    entries: HashMap<String, CacheEntry<T>>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl<T> Default for CacheStore<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }
}

/// TTL + LRU cache with anti-stampede coalescing for async operations.
///
/// `T` is the cached result type; hits return a clone.
pub struct FlowCache<T> {
    config: FlowCacheConfig,
    ttl: Duration,
    store: Mutex<CacheStore<T>>,
    /// Per-key coalescing locks, created lazily. Never pruned except by
    /// `clear()` — a deliberate memory-for-simplicity tradeoff, acceptable
    /// because the key space is bounded by the distinct requests a process
    /// actually serves.
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl<T: Clone> FlowCache<T> {
    /// Create a cache from validated options.
    pub fn new(config: FlowCacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let ttl = Duration::from_secs(config.ttl_seconds);
        Ok(Self {
            config,
            ttl,
            store: Mutex::new(CacheStore::default()),
            locks: DashMap::new(),
        })
    }

    /// Create a cache with default options (300s TTL, 1024 entries).
    pub fn with_defaults() -> Self {
        let config = FlowCacheConfig::default();
        let ttl = Duration::from_secs(config.ttl_seconds);
        Self {
            config,
            ttl,
            store: Mutex::new(CacheStore::default()),
            locks: DashMap::new(),
        }
    }

    /// Return the cached result for `(namespace, input)`, or execute `op`
    /// and cache its success.
    ///
    /// Concurrent callers sharing a cold key serialize on a per-key lock:
    /// exactly one executes `op`, the rest observe the fresh entry once the
    /// lock is released. Callers on distinct keys do not contend.
    ///
    /// `op` runs outside the store lock (but inside the per-key lock). Its
    /// error propagates unchanged and nothing is cached for it, so a later
    /// caller retries rather than seeing a stale negative result. If the
    /// returned future is dropped mid-flight the per-key lock is released
    /// with it.
    pub async fn get_or_call<F, Fut, E>(
        &self,
        namespace: &str,
        input: &Value,
        op: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.config.enabled {
            return op().await;
        }

        let key = make_cache_key(namespace, input);
        let key_lock = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        let _coalesce = key_lock.lock().await;

        if let Some(value) = self.lookup(&key) {
            return Ok(value);
        }

        let value = op().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Remove the entry for `(namespace, input)`. Returns whether an entry
    /// was present (expired entries still physically present count).
    pub fn invalidate(&self, namespace: &str, input: &Value) -> bool {
        if !self.config.enabled {
            return false;
        }
        let key = make_cache_key(namespace, input);
        let removed = self
            .store
            .lock()
            .expect("cache store lock poisoned")
            .entries
            .remove(&key)
            .is_some();
        if removed {
            debug!(key = %key, "cache entry invalidated");
        }
        removed
    }

    /// Empty the store, the lock table, and the hit/miss counters.
    pub fn clear(&self) {
        {
            let mut store = self.store.lock().expect("cache store lock poisoned");
            store.entries.clear();
            store.hits = 0;
            store.misses = 0;
            store.tick = 0;
        }
        self.locks.clear();
        debug!("cache cleared");
    }

    /// Point-in-time snapshot of counters and configuration.
    pub fn stats(&self) -> CacheStats {
        let store = self.store.lock().expect("cache store lock poisoned");
        let lookups = store.hits + store.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            store.hits as f64 / lookups as f64
        };
        CacheStats {
            hits: store.hits,
            misses: store.misses,
            hit_rate,
            size: store.entries.len(),
            max_size: self.config.max_size,
            ttl_seconds: self.config.ttl_seconds,
            enabled: self.config.enabled,
        }
    }

    /// Number of physically present entries (expired ones included until
    /// the next read touches them).
    pub fn len(&self) -> usize {
        self.store
            .lock()
            .expect("cache store lock poisoned")
            .entries
            .len()
    }

    /// True if no entries are present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- private helpers ---------------------------------------------------

    /// Check the store for a live entry. A hit refreshes LRU order; an
    /// expired entry is removed and counts as a miss. TTL comparison is
    /// strict: an entry exactly `ttl` old is already expired.
    fn lookup(&self, key: &str) -> Option<T> {
        let mut store = self.store.lock().expect("cache store lock poisoned");

        // Check expiry with an immutable borrow first to avoid overlapping
        // borrows of the entry map.
        let state = store
            .entries
            .get(key)
            .map(|e| e.created_at.elapsed() < self.ttl);
        match state {
            Some(true) => {
                store.tick += 1;
                let tick = store.tick;
                let entry = store.entries.get_mut(key).expect("entry checked above");
                entry.last_access = tick;
                let value = entry.value.clone();
                store.hits += 1;
                debug!(key = %key, "cache hit");
                Some(value)
            }
            Some(false) => {
                store.entries.remove(key);
                store.misses += 1;
                debug!(key = %key, "cache entry expired");
                None
            }
            None => {
                store.misses += 1;
                debug!(key = %key, "cache miss");
                None
            }
        }
    }

    /// Upsert a fresh entry as MRU, then evict LRU entries while over
    /// capacity. The fresh entry holds the highest tick, so it is never
    /// the eviction victim (`max_size >= 1` is enforced at construction).
    fn insert(&self, key: String, value: T) {
        let mut store = self.store.lock().expect("cache store lock poisoned");
        store.tick += 1;
        let tick = store.tick;
        store.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
                last_access: tick,
            },
        );
        while store.entries.len() > self.config.max_size {
            let lru_key = store
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            match lru_key {
                Some(k) => {
                    store.entries.remove(&k);
                    debug!(key = %k, "evicted LRU cache entry");
                }
                None => break,
            }
        }
    }
}

/// Aggregate cache statistics, shaped for a metrics exporter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Reads answered from the store.
    pub hits: u64,
    /// Reads that fell through to the wrapped operation.
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0.0 before the first lookup.
    pub hit_rate: f64,
    /// Entries currently present.
    pub size: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Configured TTL.
    pub ttl_seconds: u64,
    /// Whether the cache is active.
    pub enabled: bool,
}
