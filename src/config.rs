//! Constructor options for the cache and the circuit breaker.
//!
//! Both structs are serde-friendly so they can be embedded in an
//! application's config file, with per-field defaults applied for any
//! omitted key. Validation happens once, at construction — see
//! [`ConfigError`](crate::error::ConfigError).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Options for [`FlowCache`](crate::cache::FlowCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowCacheConfig {
    /// Maximum entry age in seconds; an entry this old is treated as absent.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Maximum number of entries before LRU eviction kicks in.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// When false, every call executes directly and no state is kept.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for FlowCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            max_size: default_max_size(),
            enabled: default_enabled(),
        }
    }
}

impl FlowCacheConfig {
    /// Reject non-positive limits. A zero `max_size` would force eviction of
    /// the entry just inserted; a zero TTL makes every read a miss.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_seconds == 0 {
            return Err(ConfigError::NonPositive {
                component: "flow_cache",
                field: "ttl_seconds",
            });
        }
        if self.max_size == 0 {
            return Err(ConfigError::NonPositive {
                component: "flow_cache",
                field: "max_size",
            });
        }
        Ok(())
    }
}

fn default_ttl_seconds() -> u64 {
    300
}

fn default_max_size() -> usize {
    1024
}

fn default_enabled() -> bool {
    true
}

/// Options for [`CircuitBreaker`](crate::breaker::CircuitBreaker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the circuit open.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Cooldown in seconds before an open circuit admits a probe.
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout: f64,
    /// Maximum concurrent probe calls while half-open.
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
    /// When false, every call executes directly and no state is kept.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Label used in logs and the `Open` error. Not an identity — the
    /// breaker is a single global admission gate regardless of name.
    #[serde(default = "default_breaker_name")]
    pub name: String,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout: default_recovery_timeout(),
            half_open_max_calls: default_half_open_max_calls(),
            enabled: default_enabled(),
            name: default_breaker_name(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Reject non-positive thresholds and timeouts that cannot be
    /// represented as a `Duration` (non-finite or overflowing values).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::NonPositive {
                component: "circuit_breaker",
                field: "failure_threshold",
            });
        }
        if !(self.recovery_timeout > 0.0) {
            return Err(ConfigError::NonPositive {
                component: "circuit_breaker",
                field: "recovery_timeout",
            });
        }
        if std::time::Duration::try_from_secs_f64(self.recovery_timeout).is_err() {
            return Err(ConfigError::OutOfRange {
                component: "circuit_breaker",
                field: "recovery_timeout",
            });
        }
        if self.half_open_max_calls == 0 {
            return Err(ConfigError::NonPositive {
                component: "circuit_breaker",
                field: "half_open_max_calls",
            });
        }
        Ok(())
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> f64 {
    30.0
}

fn default_half_open_max_calls() -> u32 {
    1
}

fn default_breaker_name() -> String {
    "default".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_defaults() {
        let cfg = FlowCacheConfig::default();
        assert_eq!(cfg.ttl_seconds, 300);
        assert_eq!(cfg.max_size, 1024);
        assert!(cfg.enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_cache_config_rejects_zero_ttl() {
        let cfg = FlowCacheConfig {
            ttl_seconds: 0,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NonPositive {
                component: "flow_cache",
                field: "ttl_seconds",
            })
        );
    }

    #[test]
    fn test_cache_config_rejects_zero_max_size() {
        let cfg = FlowCacheConfig {
            max_size: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_breaker_config_defaults() {
        let cfg = CircuitBreakerConfig::default();
        assert_eq!(cfg.failure_threshold, 5);
        assert_eq!(cfg.recovery_timeout, 30.0);
        assert_eq!(cfg.half_open_max_calls, 1);
        assert!(cfg.enabled);
        assert_eq!(cfg.name, "default");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_breaker_config_rejects_non_positive_fields() {
        for cfg in [
            CircuitBreakerConfig {
                failure_threshold: 0,
                ..Default::default()
            },
            CircuitBreakerConfig {
                recovery_timeout: 0.0,
                ..Default::default()
            },
            CircuitBreakerConfig {
                recovery_timeout: -1.0,
                ..Default::default()
            },
            CircuitBreakerConfig {
                half_open_max_calls: 0,
                ..Default::default()
            },
        ] {
            assert!(cfg.validate().is_err(), "should reject: {cfg:?}");
        }
    }

    #[test]
    fn test_breaker_config_rejects_unrepresentable_recovery_timeout() {
        // Positive but not representable as a Duration: must fail
        // validation, not panic later in the constructor.
        for timeout in [1e20, f64::INFINITY] {
            let cfg = CircuitBreakerConfig {
                recovery_timeout: timeout,
                ..Default::default()
            };
            assert_eq!(
                cfg.validate(),
                Err(crate::error::ConfigError::OutOfRange {
                    component: "circuit_breaker",
                    field: "recovery_timeout",
                }),
                "should reject recovery_timeout = {timeout}"
            );
        }
        // NaN fails the positivity check instead.
        let cfg = CircuitBreakerConfig {
            recovery_timeout: f64::NAN,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(crate::error::ConfigError::NonPositive {
                component: "circuit_breaker",
                field: "recovery_timeout",
            })
        );
    }

    #[test]
    fn test_configs_deserialize_with_defaults() {
        let cache: FlowCacheConfig = serde_json::from_str(r#"{"ttl_seconds": 60}"#).unwrap();
        assert_eq!(cache.ttl_seconds, 60);
        assert_eq!(cache.max_size, 1024);

        let breaker: CircuitBreakerConfig =
            serde_json::from_str(r#"{"name": "llm", "failure_threshold": 2}"#).unwrap();
        assert_eq!(breaker.name, "llm");
        assert_eq!(breaker.failure_threshold, 2);
        assert_eq!(breaker.recovery_timeout, 30.0);
    }
}
