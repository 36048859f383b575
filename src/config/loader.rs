//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ClientConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackoffConfig, CircuitBreakerConfig, LogFormat};
    use crate::resilience::BreakerPolicy;
    use std::time::Duration;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(
            r#"
            [[downstreams]]
            name = "products"
            base_url = "http://localhost:5003/api/products/"
            "#,
        )
        .unwrap();

        assert_eq!(config.observability.log_format, LogFormat::Pretty);
        let d = config.downstream("products").unwrap();
        assert!(d.circuit_breaker.is_none());
        assert!(d.retry.enabled);
        assert_eq!(d.retry.max_attempts, 3);
        assert_eq!(d.timeouts.attempt_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_full_config() {
        let config = parse_config(
            r#"
            [observability]
            log_level = "debug"
            log_format = "json"

            [[downstreams]]
            name = "products"
            base_url = "http://localhost:5003/api/products/"
            timeouts = { attempt_ms = 0 }

            [downstreams.circuit_breaker]
            kind = "consecutive"
            failure_threshold = 3
            open_duration_secs = 10

            [downstreams.retry]
            max_attempts = 5
            backoff = { kind = "fixed", delay_ms = 10000 }

            [downstreams.classification]
            transient_statuses = [404]
            "#,
        )
        .unwrap();

        assert_eq!(config.observability.log_format, LogFormat::Json);
        let d = config.downstream("products").unwrap();
        assert_eq!(d.timeouts.attempt_timeout(), None);
        assert_eq!(
            d.circuit_breaker.as_ref().map(CircuitBreakerConfig::to_policy),
            Some(BreakerPolicy::Consecutive {
                failure_threshold: 3,
                open_duration: Duration::from_secs(10),
            })
        );
        assert_eq!(d.retry.backoff, BackoffConfig::Fixed { delay_ms: 10_000 });
        assert_eq!(d.retry.to_policy().delay_for_attempt(3), Duration::from_secs(10));
        assert!(d
            .classification
            .to_classifier()
            .classify_status(axum::http::StatusCode::NOT_FOUND)
            .is_transient());
    }

    #[test]
    fn test_ratio_defaults() {
        let config = parse_config(
            r#"
            [[downstreams]]
            name = "products"
            base_url = "http://localhost:5003/"
            circuit_breaker = { kind = "failure_ratio" }
            "#,
        )
        .unwrap();

        assert_eq!(
            config.downstreams[0].circuit_breaker.as_ref().unwrap().to_policy(),
            BreakerPolicy::FailureRatio {
                failure_ratio: 0.5,
                sampling_duration: Duration::from_secs(30),
                minimum_throughput: 10,
                open_duration: Duration::from_secs(50),
            }
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = parse_config(
            r#"
            [[downstreams]]
            name = "products"
            base_url = "not a url"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(ref e)) if e.len() == 1));
    }

    #[test]
    fn test_unknown_breaker_kind_is_parse_error() {
        let result = parse_config(
            r#"
            [[downstreams]]
            name = "products"
            base_url = "http://localhost:5003/"
            circuit_breaker = { kind = "sometimes" }
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
