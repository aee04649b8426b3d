//! Deterministic cache-key derivation.
//!
//! A key is `"namespace:hash16"` — a SHA-256 digest of the canonically
//! serialized input, truncated to 16 hex characters. 64 bits is plenty for
//! collision avoidance in a bounded cache; this is not a security boundary.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex characters kept from the digest (64 bits).
const HASH_LEN: usize = 16;

/// Derive a stable cache key for `input` under `namespace`.
///
/// Canonicalization rules:
/// - `Value::String` is hashed as the raw string, no JSON quoting.
/// - Any other `Value` is hashed as its compact JSON encoding. serde_json's
///   default object map keeps keys sorted, so two objects with the same
///   fields in different insertion order produce the same key, and fields
///   a caller's `Serialize` impl skips are simply absent.
///
/// Equal logical input under the same namespace always yields an identical
/// key. Distinct namespaces can never collide: the hash suffix has fixed
/// length, so equal keys imply equal namespaces.
pub fn make_cache_key(namespace: &str, input: &Value) -> String {
    let mut hasher = Sha256::new();
    match input {
        Value::String(s) => hasher.update(s.as_bytes()),
        other => hasher.update(other.to_string().as_bytes()),
    }
    let digest = hex::encode(hasher.finalize());
    format!("{namespace}:{}", &digest[..HASH_LEN])
}
