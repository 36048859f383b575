//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, ratio in (0, 1], durations > 0)
//! - Check downstream names are unique and base URLs usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::{BackoffConfig, CircuitBreakerConfig, ClientConfig, DownstreamConfig};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("downstream #{0} has an empty name")]
    EmptyName(usize),

    #[error("downstream '{0}' is defined more than once")]
    DuplicateName(String),

    #[error("downstream '{downstream}': invalid base_url: {reason}")]
    InvalidBaseUrl { downstream: String, reason: String },

    #[error("downstream '{downstream}': {field} {reason}")]
    InvalidValue {
        downstream: String,
        field: &'static str,
        reason: &'static str,
    },

    #[error("downstream '{downstream}': {status} is not an HTTP status code")]
    InvalidStatus { downstream: String, status: u16 },

    #[error("invalid metrics_address '{0}'")]
    InvalidMetricsAddress(String),
}

pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    for (index, downstream) in config.downstreams.iter().enumerate() {
        if downstream.name.trim().is_empty() {
            errors.push(ValidationError::EmptyName(index));
        } else if !seen.insert(downstream.name.as_str()) {
            errors.push(ValidationError::DuplicateName(downstream.name.clone()));
        }
        validate_downstream(downstream, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_downstream(d: &DownstreamConfig, errors: &mut Vec<ValidationError>) {
    let invalid = |field: &'static str, reason: &'static str| ValidationError::InvalidValue {
        downstream: d.name.clone(),
        field,
        reason,
    };

    match Url::parse(&d.base_url) {
        Ok(url) if url.scheme() != "http" => errors.push(ValidationError::InvalidBaseUrl {
            downstream: d.name.clone(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Ok(url) if url.cannot_be_a_base() => errors.push(ValidationError::InvalidBaseUrl {
            downstream: d.name.clone(),
            reason: "cannot be used as a base".to_string(),
        }),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidBaseUrl {
            downstream: d.name.clone(),
            reason: e.to_string(),
        }),
    }

    if d.max_body_bytes == 0 {
        errors.push(invalid("max_body_bytes", "must be greater than 0"));
    }

    match &d.circuit_breaker {
        Some(CircuitBreakerConfig::Consecutive {
            failure_threshold,
            open_duration_secs,
        }) => {
            if *failure_threshold == 0 {
                errors.push(invalid("circuit_breaker.failure_threshold", "must be greater than 0"));
            }
            if *open_duration_secs == 0 {
                errors.push(invalid("circuit_breaker.open_duration_secs", "must be greater than 0"));
            }
        }
        Some(CircuitBreakerConfig::FailureRatio {
            failure_ratio,
            sampling_duration_secs,
            minimum_throughput,
            open_duration_secs,
        }) => {
            if !(*failure_ratio > 0.0 && *failure_ratio <= 1.0) {
                errors.push(invalid("circuit_breaker.failure_ratio", "must be in (0, 1]"));
            }
            if *sampling_duration_secs == 0 {
                errors.push(invalid("circuit_breaker.sampling_duration_secs", "must be greater than 0"));
            }
            if *minimum_throughput == 0 {
                errors.push(invalid("circuit_breaker.minimum_throughput", "must be greater than 0"));
            }
            if *open_duration_secs == 0 {
                errors.push(invalid("circuit_breaker.open_duration_secs", "must be greater than 0"));
            }
        }
        None => {}
    }

    if let BackoffConfig::Exponential {
        base_delay_ms,
        max_delay_ms,
        ..
    } = d.retry.backoff
    {
        if max_delay_ms < base_delay_ms {
            errors.push(invalid("retry.backoff.max_delay_ms", "must not be below base_delay_ms"));
        }
    }

    let statuses = d
        .classification
        .transient_statuses
        .iter()
        .chain(d.classification.permanent_statuses.iter());
    for status in statuses {
        if !(100..=599).contains(status) {
            errors.push(ValidationError::InvalidStatus {
                downstream: d.name.clone(),
                status: *status,
            });
        }
    }
}
