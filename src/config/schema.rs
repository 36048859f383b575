//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::{BreakerPolicy, DelayStrategy, OutcomeClassifier, RetryPolicy};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Downstream services, each with its own policies.
    pub downstreams: Vec<DownstreamConfig>,
}

impl ClientConfig {
    pub fn downstream(&self, name: &str) -> Option<&DownstreamConfig> {
        self.downstreams.iter().find(|d| d.name == name)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// One downstream dependency and the policies guarding it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownstreamConfig {
    /// Unique downstream identifier for logs/metrics.
    pub name: String,

    /// Base address; request paths are joined onto it
    /// (e.g. "http://localhost:5003/api/products/").
    pub base_url: String,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Largest response body buffered per attempt.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Breaker variant; omit to run without a breaker.
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub classification: ClassificationConfig,
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single attempt in milliseconds (0 disables).
    pub attempt_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { attempt_ms: 30_000 }
    }
}

impl TimeoutConfig {
    pub fn attempt_timeout(&self) -> Option<Duration> {
        (self.attempt_ms > 0).then(|| Duration::from_millis(self.attempt_ms))
    }
}

/// Circuit breaker variant and parameters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CircuitBreakerConfig {
    Consecutive {
        /// Consecutive transient failures that open the circuit.
        #[serde(default = "default_failure_threshold")]
        failure_threshold: u32,

        #[serde(default = "default_consecutive_open_secs")]
        open_duration_secs: u64,
    },
    FailureRatio {
        /// Failure ratio in (0, 1] that opens the circuit.
        #[serde(default = "default_failure_ratio")]
        failure_ratio: f64,

        #[serde(default = "default_sampling_secs")]
        sampling_duration_secs: u64,

        /// Attempts required in the window before the ratio is evaluated.
        #[serde(default = "default_minimum_throughput")]
        minimum_throughput: u32,

        #[serde(default = "default_ratio_open_secs")]
        open_duration_secs: u64,
    },
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_consecutive_open_secs() -> u64 {
    10
}

fn default_failure_ratio() -> f64 {
    0.5
}

fn default_sampling_secs() -> u64 {
    30
}

fn default_minimum_throughput() -> u32 {
    10
}

fn default_ratio_open_secs() -> u64 {
    50
}

impl CircuitBreakerConfig {
    pub fn to_policy(&self) -> BreakerPolicy {
        match self {
            CircuitBreakerConfig::Consecutive {
                failure_threshold,
                open_duration_secs,
            } => BreakerPolicy::Consecutive {
                failure_threshold: *failure_threshold,
                open_duration: Duration::from_secs(*open_duration_secs),
            },
            CircuitBreakerConfig::FailureRatio {
                failure_ratio,
                sampling_duration_secs,
                minimum_throughput,
                open_duration_secs,
            } => BreakerPolicy::FailureRatio {
                failure_ratio: *failure_ratio,
                sampling_duration: Duration::from_secs(*sampling_duration_secs),
                minimum_throughput: *minimum_throughput,
                open_duration: Duration::from_secs(*open_duration_secs),
            },
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Total attempts per call, including the first.
    pub max_attempts: u32,

    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        if !self.enabled {
            return RetryPolicy::none();
        }
        RetryPolicy::new(self.max_attempts, self.backoff.to_strategy())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    Fixed {
        delay_ms: u64,
    },
    Exponential {
        base_delay_ms: u64,
        max_delay_ms: u64,
        #[serde(default = "default_jitter")]
        jitter: bool,
    },
}

fn default_jitter() -> bool {
    true
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Exponential {
            base_delay_ms: 100,
            max_delay_ms: 2000,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    pub fn to_strategy(&self) -> DelayStrategy {
        match self {
            BackoffConfig::Fixed { delay_ms } => DelayStrategy::Fixed(Duration::from_millis(*delay_ms)),
            BackoffConfig::Exponential {
                base_delay_ms,
                max_delay_ms,
                jitter,
            } => DelayStrategy::Exponential {
                base: Duration::from_millis(*base_delay_ms),
                max: Duration::from_millis(*max_delay_ms),
                jitter: *jitter,
            },
        }
    }
}

/// Which responses count as failures. 5xx (when enabled) and 408 are always
/// transient; the lists add to that.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub server_errors_transient: bool,

    /// Extra statuses to retry and count against breaker health (e.g. 404).
    pub transient_statuses: Vec<u16>,

    /// Statuses that fail the call immediately without touching breaker health.
    pub permanent_statuses: Vec<u16>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            server_errors_transient: true,
            transient_statuses: Vec::new(),
            permanent_statuses: Vec::new(),
        }
    }
}

impl ClassificationConfig {
    pub fn to_classifier(&self) -> OutcomeClassifier {
        let classifier = OutcomeClassifier::new().server_errors_transient(self.server_errors_transient);
        let classifier = self
            .transient_statuses
            .iter()
            .fold(classifier, |c, status| c.with_transient_status(*status));
        self.permanent_statuses
            .iter()
            .fold(classifier, |c, status| c.with_permanent_status(*status))
    }
}
