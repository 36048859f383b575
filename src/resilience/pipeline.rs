//! Policy pipeline: breaker(retry(transport)).
//!
//! # Data Flow
//! ```text
//! execute(request)
//!     → breaker gate (reject fast when open)
//!     → transport attempt (bounded by the attempt deadline)
//!     → classifier → breaker bookkeeping
//!     → retry decision: return, or wait and go back to the gate
//! ```
//!
//! Every attempt, first or retried, passes the breaker gate. A circuit found
//! open before a retry delay ends the call at once with `BrokenCircuit`;
//! rejected calls never count as attempts.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::observability::metrics;
use crate::resilience::circuit_breaker::{BreakerPolicy, BreakerSnapshot, BrokenCircuit, CircuitBreaker};
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::hooks::{fire, PolicyObserver, TracingObserver};
use crate::resilience::outcome::{Outcome, OutcomeClassifier};
use crate::resilience::retries::{RetryDecision, RetryPolicy};
use crate::resilience::timeouts::with_deadline;
use crate::transport::{DownstreamResponse, RequestDescriptor, Transport, TransportFault};

/// The last thing that went wrong in a failed call.
#[derive(Debug, Error)]
pub enum AttemptFailure {
    #[error("downstream returned {}", .0.status)]
    Response(DownstreamResponse),

    #[error(transparent)]
    Fault(TransportFault),
}

impl From<Result<DownstreamResponse, TransportFault>> for AttemptFailure {
    fn from(result: Result<DownstreamResponse, TransportFault>) -> Self {
        match result {
            Ok(response) => AttemptFailure::Response(response),
            Err(fault) => AttemptFailure::Fault(fault),
        }
    }
}

/// Terminal failure of a call made through a pipeline.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error(transparent)]
    BrokenCircuit(#[from] BrokenCircuit),

    #[error("call to '{downstream}' failed after {attempts} attempts: {last}")]
    ExhaustedRetries {
        downstream: String,
        attempts: u32,
        last: AttemptFailure,
    },

    #[error("call to '{downstream}' failed permanently: {failure}")]
    Permanent {
        downstream: String,
        failure: AttemptFailure,
    },

    #[error("call to '{downstream}' was cancelled")]
    Cancelled { downstream: String },
}

impl PolicyError {
    /// True when the downstream should be reported as unavailable (503).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, PolicyError::BrokenCircuit(_) | PolicyError::ExhaustedRetries { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            PolicyError::BrokenCircuit(_) => "broken_circuit",
            PolicyError::ExhaustedRetries { .. } => "exhausted_retries",
            PolicyError::Permanent { .. } => "permanent_failure",
            PolicyError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Resilient entry point for one downstream.
pub struct Pipeline {
    name: String,
    transport: Arc<dyn Transport>,
    classifier: OutcomeClassifier,
    breaker: Option<Arc<CircuitBreaker>>,
    retry: RetryPolicy,
    attempt_timeout: Option<Duration>,
    observer: Arc<dyn PolicyObserver>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("breaker", &self.breaker)
            .field("retry", &self.retry)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

impl Pipeline {
    pub fn builder(name: impl Into<String>, transport: Arc<dyn Transport>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            transport,
            classifier: OutcomeClassifier::default(),
            breaker: None,
            retry: RetryPolicy::none(),
            attempt_timeout: None,
            observer: Arc::new(TracingObserver),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    pub fn snapshot(&self) -> Option<BreakerSnapshot> {
        self.breaker.as_ref().map(|b| b.snapshot())
    }

    /// Run `request` under this pipeline's policies.
    pub async fn execute(&self, request: &RequestDescriptor) -> Result<DownstreamResponse, PolicyError> {
        let started = Instant::now();
        let result = self.run(request).await;

        let label = match &result {
            Ok(_) => "success",
            Err(e) => e.label(),
        };
        metrics::record_call(&self.name, label, started);
        result
    }

    /// Like `execute`, but gives up as soon as `cancel` completes. A cancelled
    /// attempt is not recorded and any pending retry delay is skipped.
    pub async fn execute_with_cancel<C>(
        &self,
        request: &RequestDescriptor,
        cancel: C,
    ) -> Result<DownstreamResponse, PolicyError>
    where
        C: Future<Output = ()>,
    {
        let started = Instant::now();
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::debug!(downstream = %self.name, request_id = %request.request_id, "Call cancelled");
                metrics::record_call(&self.name, "cancelled", started);
                Err(PolicyError::Cancelled { downstream: self.name.clone() })
            }
            result = self.execute(request) => result,
        }
    }

    async fn run(&self, request: &RequestDescriptor) -> Result<DownstreamResponse, PolicyError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let permit = match &self.breaker {
                Some(breaker) => match breaker.try_acquire() {
                    Ok(permit) => Some(permit),
                    Err(rejected) => {
                        tracing::debug!(
                            downstream = %self.name,
                            request_id = %request.request_id,
                            attempt,
                            state = rejected.state.as_str(),
                            "Call rejected by circuit breaker"
                        );
                        return Err(rejected.into());
                    }
                },
                None => None,
            };

            let result = with_deadline(self.attempt_timeout, self.transport.invoke(request)).await;
            let outcome = self.classifier.classify(&result);
            metrics::record_attempt(&self.name, outcome.label());

            tracing::debug!(
                downstream = %self.name,
                request_id = %request.request_id,
                attempt,
                outcome = outcome.label(),
                "Attempt finished"
            );

            if let Some(permit) = permit {
                permit.record(&outcome);
            }

            match self.retry.decide(attempt, &outcome) {
                RetryDecision::Stop => return self.finish(outcome, result),
                RetryDecision::Exhausted => {
                    tracing::warn!(
                        downstream = %self.name,
                        request_id = %request.request_id,
                        attempts = attempt,
                        "Retries exhausted"
                    );
                    return Err(PolicyError::ExhaustedRetries {
                        downstream: self.name.clone(),
                        attempts: attempt,
                        last: result.into(),
                    });
                }
                RetryDecision::RetryAfter(delay) => {
                    if let Some(rejected) = self.breaker.as_ref().and_then(|b| b.open_rejection()) {
                        tracing::debug!(
                            downstream = %self.name,
                            request_id = %request.request_id,
                            attempt,
                            "Circuit opened mid-call; remaining retries skipped"
                        );
                        return Err(rejected.into());
                    }
                    if let Some(failure) = outcome.failure() {
                        fire(|| self.observer.on_retry_attempt(&self.name, attempt, delay, failure));
                    }
                    metrics::record_retry(&self.name);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn finish(
        &self,
        outcome: Outcome,
        result: Result<DownstreamResponse, TransportFault>,
    ) -> Result<DownstreamResponse, PolicyError> {
        match (outcome, result) {
            (Outcome::Success, Ok(response)) => Ok(response),
            (_, result) => Err(PolicyError::Permanent {
                downstream: self.name.clone(),
                failure: result.into(),
            }),
        }
    }
}

pub struct PipelineBuilder {
    name: String,
    transport: Arc<dyn Transport>,
    classifier: OutcomeClassifier,
    breaker: Option<BreakerPolicy>,
    retry: RetryPolicy,
    attempt_timeout: Option<Duration>,
    observer: Arc<dyn PolicyObserver>,
    clock: Arc<dyn Clock>,
}

impl PipelineBuilder {
    pub fn classifier(mut self, classifier: OutcomeClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn circuit_breaker(mut self, policy: BreakerPolicy) -> Self {
        self.breaker = Some(policy);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PolicyObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Pipeline {
        let breaker = self.breaker.map(|policy| {
            Arc::new(CircuitBreaker::with_parts(
                self.name.clone(),
                policy,
                self.clock.clone(),
                self.observer.clone(),
            ))
        });

        Pipeline {
            name: self.name,
            transport: self.transport,
            classifier: self.classifier,
            breaker,
            retry: self.retry,
            attempt_timeout: self.attempt_timeout,
            observer: self.observer,
        }
    }
}
