//! Observability hooks for breaker transitions and retries.
//!
//! # Design Decisions
//! - Every hook has a no-op default, observers override what they need
//! - Hooks run after the breaker lock is released
//! - A panicking observer is contained and logged, never propagated

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::outcome::FailureInfo;

pub trait PolicyObserver: Send + Sync {
    fn on_circuit_opened(&self, _downstream: &str, _previous: CircuitState, _failure: &FailureInfo) {}

    fn on_circuit_closed(&self, _downstream: &str) {}

    fn on_circuit_half_open(&self, _downstream: &str) {}

    fn on_retry_attempt(&self, _downstream: &str, _attempt: u32, _delay: Duration, _last_failure: &FailureInfo) {}
}

/// Run a hook, swallowing any panic it raises.
pub(crate) fn fire<F>(hook: F)
where
    F: FnOnce(),
{
    if catch_unwind(AssertUnwindSafe(hook)).is_err() {
        tracing::error!("Policy observer panicked; event dropped");
    }
}

/// Logs transitions and retries.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PolicyObserver for TracingObserver {
    fn on_circuit_opened(&self, downstream: &str, previous: CircuitState, failure: &FailureInfo) {
        tracing::warn!(
            downstream = %downstream,
            previous = ?previous,
            failure = %failure,
            "Circuit breaker opened"
        );
    }

    fn on_circuit_closed(&self, downstream: &str) {
        tracing::info!(downstream = %downstream, "Circuit breaker closed");
    }

    fn on_circuit_half_open(&self, downstream: &str) {
        tracing::info!(downstream = %downstream, "Circuit breaker half-open, probing");
    }

    fn on_retry_attempt(&self, downstream: &str, attempt: u32, delay: Duration, last_failure: &FailureInfo) {
        tracing::info!(
            downstream = %downstream,
            attempt,
            delay = ?delay,
            failure = %last_failure,
            "Retrying downstream call"
        );
    }
}

/// Fans each event out to several observers.
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn PolicyObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn PolicyObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

// Each observer is isolated so one panic does not starve the rest.
impl PolicyObserver for ObserverSet {
    fn on_circuit_opened(&self, downstream: &str, previous: CircuitState, failure: &FailureInfo) {
        for o in &self.observers {
            fire(|| o.on_circuit_opened(downstream, previous, failure));
        }
    }

    fn on_circuit_closed(&self, downstream: &str) {
        for o in &self.observers {
            fire(|| o.on_circuit_closed(downstream));
        }
    }

    fn on_circuit_half_open(&self, downstream: &str) {
        for o in &self.observers {
            fire(|| o.on_circuit_half_open(downstream));
        }
    }

    fn on_retry_attempt(&self, downstream: &str, attempt: u32, delay: Duration, last_failure: &FailureInfo) {
        for o in &self.observers {
            fire(|| o.on_retry_attempt(downstream, attempt, delay, last_failure));
        }
    }
}
