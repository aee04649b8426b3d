//! Failure-counting circuit breaker with bounded half-open probing.
//!
//! Three states: CLOSED (normal, failures counted), OPEN (rejecting for a
//! cooldown), HALF_OPEN (limited concurrent probes test recovery). All
//! transitions are driven by call outcomes and elapsed time, checked lazily
//! at call time — no background timer. The internal lock guards
//! microsecond-scale bookkeeping only and is never held across an await.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::{CircuitError, ConfigError};

/// Clamp ceiling for the `retry_after` hint, in seconds. Keeps pathological
/// `recovery_timeout` configurations from handing clients hour-long backoffs.
const MAX_RETRY_AFTER_SECS: f64 = 60.0;

/// Backoff hint returned while half-open probes are at capacity.
const HALF_OPEN_RETRY_AFTER_SECS: f64 = 1.0;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; consecutive failures are counted.
    Closed,
    /// Rejecting immediately until the recovery timeout elapses.
    Open,
    /// Admitting a bounded number of probe calls to test recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Open => f.write_str("open"),
            Self::HalfOpen => f.write_str("half_open"),
        }
    }
}

/// Mutable breaker state, guarded together by one mutex.
struct BreakerState {
    state: CircuitState,
    /// Consecutive failures; reset by any success in CLOSED.
    failure_count: u32,
    last_failure_time: Option<Instant>,
    /// In-flight probes while half-open.
    half_open_calls: u32,
    // Lifetime counters.
    total_calls: u64,
    successes: u64,
    failures: u64,
    rejected: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            half_open_calls: 0,
            total_calls: 0,
            successes: 0,
            failures: 0,
            rejected: 0,
        }
    }
}

/// What the admission check decided for one call.
enum Admission {
    /// Proceed under CLOSED.
    Normal,
    /// Proceed as a half-open probe, holding one of the bounded slots.
    Probe,
}

/// Circuit breaker protecting a degraded downstream dependency.
///
/// Wraps an async operation via [`call`](Self::call): after
/// `failure_threshold` consecutive failures the circuit opens and calls are
/// rejected with [`CircuitError::Open`] until `recovery_timeout` elapses,
/// then up to `half_open_max_calls` concurrent probes are admitted. One
/// probe success closes the circuit; one probe failure reopens it and
/// restarts the cooldown.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    recovery_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a breaker from validated options.
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let recovery_timeout = Duration::try_from_secs_f64(config.recovery_timeout)
            .map_err(|_| ConfigError::OutOfRange {
                component: "circuit_breaker",
                field: "recovery_timeout",
            })?;
        Ok(Self {
            config,
            recovery_timeout,
            state: Mutex::new(BreakerState::new()),
        })
    }

    /// Create a breaker with default options (threshold 5, 30s cooldown,
    /// one probe) under the given label.
    pub fn with_defaults(name: &str) -> Self {
        let config = CircuitBreakerConfig {
            name: name.to_string(),
            ..Default::default()
        };
        let recovery_timeout = Duration::from_secs_f64(config.recovery_timeout);
        Self {
            config,
            recovery_timeout,
            state: Mutex::new(BreakerState::new()),
        }
    }

    /// Execute `op` if the circuit admits it.
    ///
    /// The downstream call runs outside the breaker's lock. Its error is
    /// passed through as [`CircuitError::Inner`] after bookkeeping; a
    /// rejection surfaces as [`CircuitError::Open`] before any attempt. If
    /// the returned future is dropped mid-call, no success or failure is
    /// recorded and a reserved probe slot is released.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.config.enabled {
            return op().await.map_err(CircuitError::Inner);
        }

        let admission = self.admit()?;

        // Cancellation safety: if `op` is dropped before resolving, neither
        // arm below runs, so counters stay untouched; the guard alone gives
        // back the probe slot.
        let probe_guard = ProbeGuard {
            breaker: self,
            armed: matches!(admission, Admission::Probe),
        };
        let result = op().await;
        probe_guard.defuse();

        match result {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Administrative override: force CLOSED and zero every counter.
    pub fn reset(&self) {
        let mut s = self.state.lock().expect("breaker state lock poisoned");
        *s = BreakerState::new();
        info!(circuit = %self.config.name, "circuit breaker reset to closed");
    }

    /// Current state (with the lazy OPEN→HALF_OPEN check applied on the
    /// next call, not here — this is a plain read).
    pub fn state(&self) -> CircuitState {
        self.state
            .lock()
            .expect("breaker state lock poisoned")
            .state
    }

    /// Point-in-time snapshot of state, counters, and thresholds.
    pub fn stats(&self) -> CircuitBreakerStats {
        let s = self.state.lock().expect("breaker state lock poisoned");
        CircuitBreakerStats {
            name: self.config.name.clone(),
            state: s.state,
            failure_count: s.failure_count,
            half_open_calls: s.half_open_calls,
            total_calls: s.total_calls,
            successes: s.successes,
            failures: s.failures,
            rejected: s.rejected,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout: self.config.recovery_timeout,
            half_open_max_calls: self.config.half_open_max_calls,
            enabled: self.config.enabled,
        }
    }

    // -- private helpers ---------------------------------------------------

    /// Admission check under the lock: count the call, apply the lazy
    /// OPEN→HALF_OPEN transition, then branch on state.
    fn admit<E>(&self) -> Result<Admission, CircuitError<E>> {
        let mut s = self.state.lock().expect("breaker state lock poisoned");
        s.total_calls += 1;

        if s.state == CircuitState::Open {
            let elapsed = s
                .last_failure_time
                .map(|t| t.elapsed())
                .unwrap_or(Duration::MAX);
            if elapsed >= self.recovery_timeout {
                s.state = CircuitState::HalfOpen;
                s.half_open_calls = 0;
                info!(circuit = %self.config.name, "cooldown elapsed, probing recovery");
            }
        }

        match s.state {
            CircuitState::Open => {
                s.rejected += 1;
                let elapsed = s
                    .last_failure_time
                    .map(|t| t.elapsed().as_secs_f64())
                    .unwrap_or(0.0);
                let retry_after =
                    (self.config.recovery_timeout - elapsed).clamp(0.0, MAX_RETRY_AFTER_SECS);
                debug!(circuit = %self.config.name, retry_after, "rejecting call, circuit open");
                Err(CircuitError::Open {
                    name: self.config.name.clone(),
                    retry_after,
                })
            }
            CircuitState::HalfOpen if s.half_open_calls >= self.config.half_open_max_calls => {
                // At probe capacity: reject without consuming a slot.
                s.rejected += 1;
                debug!(circuit = %self.config.name, "rejecting call, probes at capacity");
                Err(CircuitError::Open {
                    name: self.config.name.clone(),
                    retry_after: HALF_OPEN_RETRY_AFTER_SECS,
                })
            }
            CircuitState::HalfOpen => {
                s.half_open_calls += 1;
                Ok(Admission::Probe)
            }
            CircuitState::Closed => Ok(Admission::Normal),
        }
    }

    fn on_success(&self) {
        let mut s = self.state.lock().expect("breaker state lock poisoned");
        s.successes += 1;
        match s.state {
            CircuitState::HalfOpen => {
                s.state = CircuitState::Closed;
                s.failure_count = 0;
                s.half_open_calls = 0;
                info!(circuit = %self.config.name, "probe succeeded, circuit closed");
            }
            CircuitState::Closed => {
                // Any success resets the consecutive-failure run.
                s.failure_count = 0;
            }
            CircuitState::Open => {
                // A call admitted under CLOSED finished after a concurrent
                // failure run tripped the circuit. Count it, but only a
                // half-open probe may close the circuit.
            }
        }
    }

    fn on_failure(&self) {
        let mut s = self.state.lock().expect("breaker state lock poisoned");
        s.failures += 1;
        s.failure_count += 1;
        s.last_failure_time = Some(Instant::now());
        match s.state {
            CircuitState::HalfOpen => {
                s.state = CircuitState::Open;
                s.half_open_calls = 0;
                warn!(circuit = %self.config.name, "probe failed, circuit reopened");
            }
            CircuitState::Closed if s.failure_count >= self.config.failure_threshold => {
                s.state = CircuitState::Open;
                warn!(
                    circuit = %self.config.name,
                    failures = s.failure_count,
                    "failure threshold reached, circuit opened"
                );
            }
            _ => {}
        }
    }

    /// Release a probe slot that will see no outcome (cancelled probe).
    fn release_probe_slot(&self) {
        let mut s = self.state.lock().expect("breaker state lock poisoned");
        if s.state == CircuitState::HalfOpen && s.half_open_calls > 0 {
            s.half_open_calls -= 1;
            debug!(circuit = %self.config.name, "probe cancelled, slot released");
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.state.lock().expect("breaker state lock poisoned");
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &s.state)
            .field("failure_count", &s.failure_count)
            .finish()
    }
}

/// Releases a reserved half-open slot on drop unless the call resolved.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl ProbeGuard<'_> {
    fn defuse(mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_probe_slot();
        }
    }
}

/// Read-only snapshot of breaker state, counters, and configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStats {
    /// Breaker label.
    pub name: String,
    /// State at snapshot time.
    pub state: CircuitState,
    /// Current consecutive-failure run.
    pub failure_count: u32,
    /// In-flight half-open probes.
    pub half_open_calls: u32,
    /// Calls presented for admission (including rejections).
    pub total_calls: u64,
    /// Downstream calls that returned success.
    pub successes: u64,
    /// Downstream calls that returned an error.
    pub failures: u64,
    /// Calls rejected without a downstream attempt.
    pub rejected: u64,
    /// Configured threshold.
    pub failure_threshold: u32,
    /// Configured cooldown in seconds.
    pub recovery_timeout: f64,
    /// Configured probe bound.
    pub half_open_max_calls: u32,
    /// Whether the breaker is active.
    pub enabled: bool,
}
