//! Metrics collection and exposition.
//!
//! # Metrics
//! - `downstream_attempts_total` (counter): raw attempts by downstream, outcome
//! - `downstream_calls_total` (counter): pipeline calls by downstream, result
//! - `downstream_call_duration_seconds` (histogram): end-to-end call latency
//! - `circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `circuit_breaker_transitions_total` (counter): transitions by target state
//! - `retry_attempts_total` (counter): scheduled retries
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exporter is opt-in from the binary

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_attempt(downstream: &str, outcome: &'static str) {
    counter!(
        "downstream_attempts_total",
        "downstream" => downstream.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_call(downstream: &str, result: &'static str, started: Instant) {
    counter!(
        "downstream_calls_total",
        "downstream" => downstream.to_string(),
        "result" => result
    )
    .increment(1);
    histogram!(
        "downstream_call_duration_seconds",
        "downstream" => downstream.to_string()
    )
    .record(started.elapsed().as_secs_f64());
}

pub fn set_circuit_state(downstream: &str, state: CircuitState) {
    gauge!("circuit_breaker_state", "downstream" => downstream.to_string()).set(state.as_gauge());
}

pub fn record_circuit_transition(downstream: &str, state: CircuitState) {
    set_circuit_state(downstream, state);
    counter!(
        "circuit_breaker_transitions_total",
        "downstream" => downstream.to_string(),
        "to" => state.as_str()
    )
    .increment(1);
}

pub fn record_retry(downstream: &str) {
    counter!("retry_attempts_total", "downstream" => downstream.to_string()).increment(1);
}
