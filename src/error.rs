//! Error types for the resilience layer.
//!
//! Two surfaces only:
//! - [`ConfigError`] — invalid constructor options, rejected at build time
//!   rather than at call time.
//! - [`CircuitError`] — raised by [`crate::breaker::CircuitBreaker::call`].
//!   `Open` means the call was rejected before any downstream attempt;
//!   `Inner` carries the wrapped operation's own error, untouched.
//!
//! The cache raises no custom type: it only propagates the wrapped
//! operation's error unchanged.

use thiserror::Error;

/// Invalid constructor options.
///
/// Non-positive limits and timeouts are configuration bugs; surfacing them
/// at call time would turn a one-line mistake into a silent eviction loop
/// or a breaker that never trips.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A numeric field that must be strictly positive was zero (or negative).
    #[error("{component}: {field} must be greater than zero")]
    NonPositive {
        /// Component being constructed (`"flow_cache"` or `"circuit_breaker"`).
        component: &'static str,
        /// Offending field name.
        field: &'static str,
    },

    /// A duration field was non-finite or too large to represent as a
    /// `std::time::Duration`.
    #[error("{component}: {field} is not a representable duration in seconds")]
    OutOfRange {
        /// Component being constructed.
        component: &'static str,
        /// Offending field name.
        field: &'static str,
    },
}

/// Error surface of [`crate::breaker::CircuitBreaker::call`].
///
/// Distinguishes "never tried" ([`CircuitError::Open`]) from "tried and
/// failed" ([`CircuitError::Inner`]) so callers can retry with an accurate
/// backoff hint and failure metrics stay honest.
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The breaker rejected the call before any downstream attempt.
    ///
    /// `retry_after` is a backoff hint in seconds: the remaining cooldown
    /// when the circuit is open, or ~1s when half-open probes are at
    /// capacity.
    #[error("circuit breaker '{name}' is open, retry after {retry_after:.1}s")]
    Open {
        /// Breaker label, for log correlation.
        name: String,
        /// Suggested backoff in seconds before the next attempt.
        retry_after: f64,
    },

    /// The downstream call was attempted and failed; the original error is
    /// passed through unchanged after breaker bookkeeping.
    #[error("{0}")]
    Inner(E),
}

impl<E> CircuitError<E> {
    /// The backoff hint, if this is an admission rejection.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::Open { retry_after, .. } => Some(*retry_after),
            Self::Inner(_) => None,
        }
    }

    /// True if the call was rejected without a downstream attempt.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Unwrap the downstream error, if one was attempted.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Open { .. } => None,
            Self::Inner(e) => Some(e),
        }
    }
}
