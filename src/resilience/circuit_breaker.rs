//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, attempts pass through
//! - Open: downstream assumed down, calls fail fast
//! - Half-Open: one probe tests whether the downstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: health policy trips (consecutive failures or failure ratio)
//! Open → Half-Open: first call after open_duration (lazy, no timer)
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails, open_duration restarts
//! ```
//!
//! # Design Decisions
//! - One breaker per downstream, owned by its pipeline
//! - The two variants share all transition logic; only the closed-state
//!   `HealthPolicy` differs
//! - All state lives behind one mutex; hooks fire after it is released
//! - Every transition bumps an epoch; outcomes from attempts admitted under an
//!   older epoch are dropped
//! - Permanent failures never touch breaker health

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::observability::metrics;
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::hooks::{fire, PolicyObserver, TracingObserver};
use crate::resilience::outcome::{FailureInfo, Outcome};

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: 0=closed, 1=open, 2=half-open.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Breaker variant and its parameters. Immutable once the breaker is built.
#[derive(Debug, Clone, PartialEq)]
pub enum BreakerPolicy {
    /// Opens after `failure_threshold` transient failures in a row.
    Consecutive {
        failure_threshold: u32,
        open_duration: Duration,
    },
    /// Opens when the failure ratio within a sampling window reaches the
    /// threshold, once the window has seen `minimum_throughput` attempts.
    FailureRatio {
        failure_ratio: f64,
        sampling_duration: Duration,
        minimum_throughput: u32,
        open_duration: Duration,
    },
}

impl BreakerPolicy {
    pub fn open_duration(&self) -> Duration {
        match self {
            BreakerPolicy::Consecutive { open_duration, .. } => *open_duration,
            BreakerPolicy::FailureRatio { open_duration, .. } => *open_duration,
        }
    }

    /// Pull parameters into their valid ranges: threshold and minimum
    /// throughput at least 1, ratio in (0, 1]. A NaN or non-positive ratio
    /// becomes the smallest positive ratio, so only real failures can trip it.
    pub fn clamped(self) -> Self {
        match self {
            BreakerPolicy::Consecutive {
                failure_threshold,
                open_duration,
            } => BreakerPolicy::Consecutive {
                failure_threshold: failure_threshold.max(1),
                open_duration,
            },
            BreakerPolicy::FailureRatio {
                failure_ratio,
                sampling_duration,
                minimum_throughput,
                open_duration,
            } => BreakerPolicy::FailureRatio {
                failure_ratio: if failure_ratio > 0.0 {
                    failure_ratio.min(1.0)
                } else {
                    f64::MIN_POSITIVE
                },
                sampling_duration,
                minimum_throughput: minimum_throughput.max(1),
                open_duration,
            },
        }
    }

    fn health_policy(&self, now: Instant) -> Box<dyn HealthPolicy> {
        match self {
            BreakerPolicy::Consecutive { failure_threshold, .. } => {
                Box::new(ConsecutiveFailures::new(*failure_threshold))
            }
            BreakerPolicy::FailureRatio {
                failure_ratio,
                sampling_duration,
                minimum_throughput,
                ..
            } => Box::new(FailureRatioWindow::new(
                *failure_ratio,
                *sampling_duration,
                *minimum_throughput,
                now,
            )),
        }
    }
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        BreakerPolicy::Consecutive {
            failure_threshold: 3,
            open_duration: Duration::from_secs(10),
        }
    }
}

/// Counters exposed for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthCounters {
    Consecutive { failures: u32 },
    Window { total: u32, failed: u32 },
}

/// Closed-state health evaluation.
pub trait HealthPolicy: Send + fmt::Debug {
    /// Record one outcome. Returns true when the circuit should open.
    fn record(&mut self, failed: bool, now: Instant) -> bool;

    fn reset(&mut self, now: Instant);

    fn counters(&self) -> HealthCounters;
}

#[derive(Debug)]
pub struct ConsecutiveFailures {
    threshold: u32,
    failures: u32,
}

impl ConsecutiveFailures {
    pub fn new(threshold: u32) -> Self {
        Self { threshold, failures: 0 }
    }
}

impl HealthPolicy for ConsecutiveFailures {
    fn record(&mut self, failed: bool, _now: Instant) -> bool {
        if failed {
            self.failures = self.failures.saturating_add(1);
            self.failures >= self.threshold
        } else {
            self.failures = 0;
            false
        }
    }

    fn reset(&mut self, _now: Instant) {
        self.failures = 0;
    }

    fn counters(&self) -> HealthCounters {
        HealthCounters::Consecutive { failures: self.failures }
    }
}

#[derive(Debug)]
pub struct FailureRatioWindow {
    ratio: f64,
    sampling: Duration,
    minimum_throughput: u32,
    window_start: Instant,
    total: u32,
    failed: u32,
}

impl FailureRatioWindow {
    pub fn new(ratio: f64, sampling: Duration, minimum_throughput: u32, now: Instant) -> Self {
        Self {
            ratio,
            sampling,
            minimum_throughput,
            window_start: now,
            total: 0,
            failed: 0,
        }
    }
}

impl HealthPolicy for FailureRatioWindow {
    fn record(&mut self, failed: bool, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) > self.sampling {
            self.reset(now);
        }

        self.total = self.total.saturating_add(1);
        if failed {
            self.failed = self.failed.saturating_add(1);
        }

        self.total >= self.minimum_throughput
            && f64::from(self.failed) / f64::from(self.total) >= self.ratio
    }

    fn reset(&mut self, now: Instant) {
        self.window_start = now;
        self.total = 0;
        self.failed = 0;
    }

    fn counters(&self) -> HealthCounters {
        HealthCounters::Window {
            total: self.total,
            failed: self.failed,
        }
    }
}

/// Returned when a call is rejected without reaching the downstream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("circuit for '{downstream}' is {}; call rejected", .state.as_str())]
pub struct BrokenCircuit {
    pub downstream: String,
    pub state: CircuitState,
    /// Time until a probe will be admitted. `None` while a probe is in flight.
    pub retry_after: Option<Duration>,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub downstream: String,
    pub state: CircuitState,
    pub counters: HealthCounters,
    pub probe_in_flight: bool,
    pub last_failure: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { since: Instant },
    HalfOpen { probe_in_flight: bool },
}

impl Phase {
    fn state(&self) -> CircuitState {
        match self {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug)]
struct BreakerCore {
    phase: Phase,
    epoch: u64,
    health: Box<dyn HealthPolicy>,
    last_failure: Option<FailureInfo>,
}

impl BreakerCore {
    fn move_to(&mut self, phase: Phase) {
        self.phase = phase;
        self.epoch += 1;
    }
}

enum Transition {
    Opened {
        previous: CircuitState,
        failure: FailureInfo,
    },
    HalfOpened,
    Closed,
}

/// Per-downstream circuit breaker.
pub struct CircuitBreaker {
    downstream: String,
    policy: BreakerPolicy,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn PolicyObserver>,
    core: Mutex<BreakerCore>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("downstream", &self.downstream)
            .field("policy", &self.policy)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(downstream: impl Into<String>, policy: BreakerPolicy) -> Self {
        Self::with_parts(downstream, policy, Arc::new(SystemClock), Arc::new(TracingObserver))
    }

    pub fn with_parts(
        downstream: impl Into<String>,
        policy: BreakerPolicy,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn PolicyObserver>,
    ) -> Self {
        let downstream = downstream.into();
        let requested = policy;
        let policy = requested.clone().clamped();
        if policy != requested {
            tracing::warn!(
                downstream = %downstream,
                requested = ?requested,
                effective = ?policy,
                "Circuit breaker parameters out of range; clamped"
            );
        }
        let health = policy.health_policy(clock.now());
        metrics::set_circuit_state(&downstream, CircuitState::Closed);

        Self {
            downstream,
            policy,
            clock,
            observer,
            core: Mutex::new(BreakerCore {
                phase: Phase::Closed,
                epoch: 0,
                health,
                last_failure: None,
            }),
        }
    }

    pub fn downstream(&self) -> &str {
        &self.downstream
    }

    pub fn policy(&self) -> &BreakerPolicy {
        &self.policy
    }

    /// Current state. Does not perform the lazy Open → Half-Open transition.
    pub fn state(&self) -> CircuitState {
        self.lock().phase.state()
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let core = self.lock();
        BreakerSnapshot {
            downstream: self.downstream.clone(),
            state: core.phase.state(),
            counters: core.health.counters(),
            probe_in_flight: matches!(core.phase, Phase::HalfOpen { probe_in_flight: true }),
            last_failure: core.last_failure.as_ref().map(ToString::to_string),
        }
    }

    /// The rejection the next attempt is certain to get, if the circuit is
    /// open and its open duration has not yet elapsed.
    pub fn open_rejection(&self) -> Option<BrokenCircuit> {
        let now = self.clock.now();
        let open_duration = self.policy.open_duration();
        match self.lock().phase {
            Phase::Open { since } => {
                let elapsed = now.saturating_duration_since(since);
                (elapsed < open_duration)
                    .then(|| self.rejection(CircuitState::Open, Some(open_duration - elapsed)))
            }
            _ => None,
        }
    }

    /// Ask to run one attempt.
    pub fn try_acquire(self: &Arc<Self>) -> Result<AttemptPermit, BrokenCircuit> {
        let now = self.clock.now();
        let open_duration = self.policy.open_duration();

        let (result, transition) = {
            let mut core = self.lock();
            match core.phase {
                Phase::Closed => (Ok(self.permit(core.epoch, false)), None),
                Phase::Open { since } => {
                    let elapsed = now.saturating_duration_since(since);
                    if elapsed >= open_duration {
                        core.move_to(Phase::HalfOpen { probe_in_flight: true });
                        (Ok(self.permit(core.epoch, true)), Some(Transition::HalfOpened))
                    } else {
                        (Err(self.rejection(CircuitState::Open, Some(open_duration - elapsed))), None)
                    }
                }
                Phase::HalfOpen { probe_in_flight: true } => {
                    (Err(self.rejection(CircuitState::HalfOpen, None)), None)
                }
                Phase::HalfOpen { probe_in_flight: false } => {
                    core.phase = Phase::HalfOpen { probe_in_flight: true };
                    (Ok(self.permit(core.epoch, true)), None)
                }
            }
        };

        if let Some(transition) = transition {
            self.emit(transition);
        }
        result
    }

    fn permit(self: &Arc<Self>, epoch: u64, probe: bool) -> AttemptPermit {
        AttemptPermit {
            breaker: Arc::clone(self),
            epoch,
            probe,
            settled: false,
        }
    }

    fn rejection(&self, state: CircuitState, retry_after: Option<Duration>) -> BrokenCircuit {
        BrokenCircuit {
            downstream: self.downstream.clone(),
            state,
            retry_after,
        }
    }

    fn on_outcome(&self, epoch: u64, probe: bool, outcome: &Outcome) {
        let now = self.clock.now();

        let transition = {
            let mut core = self.lock();
            if core.epoch != epoch {
                tracing::trace!(downstream = %self.downstream, "Ignoring outcome from a previous breaker epoch");
                None
            } else {
                if let Some(info) = outcome.failure().filter(|_| outcome.is_transient()) {
                    core.last_failure = Some(info.clone());
                }
                match (core.phase, outcome) {
                    (Phase::HalfOpen { .. }, Outcome::PermanentFailure(_)) if probe => {
                        core.phase = Phase::HalfOpen { probe_in_flight: false };
                        None
                    }
                    (_, Outcome::PermanentFailure(_)) => None,
                    (Phase::Closed, _) => {
                        if core.health.record(outcome.is_transient(), now) {
                            let failure = core
                                .last_failure
                                .clone()
                                .unwrap_or_else(|| FailureInfo::Fault("failure ratio exceeded".into()));
                            core.move_to(Phase::Open { since: now });
                            Some(Transition::Opened {
                                previous: CircuitState::Closed,
                                failure,
                            })
                        } else {
                            None
                        }
                    }
                    (Phase::HalfOpen { .. }, Outcome::Success) if probe => {
                        core.health.reset(now);
                        core.last_failure = None;
                        core.move_to(Phase::Closed);
                        Some(Transition::Closed)
                    }
                    (Phase::HalfOpen { .. }, Outcome::TransientFailure(info)) if probe => {
                        core.move_to(Phase::Open { since: now });
                        Some(Transition::Opened {
                            previous: CircuitState::HalfOpen,
                            failure: info.clone(),
                        })
                    }
                    _ => None,
                }
            }
        };

        if let Some(transition) = transition {
            self.emit(transition);
        }
    }

    fn release_probe(&self, epoch: u64) {
        let mut core = self.lock();
        if core.epoch == epoch {
            if let Phase::HalfOpen { probe_in_flight: true } = core.phase {
                core.phase = Phase::HalfOpen { probe_in_flight: false };
                tracing::debug!(downstream = %self.downstream, "Probe abandoned; next call may probe");
            }
        }
    }

    fn emit(&self, transition: Transition) {
        let downstream = self.downstream.as_str();
        match transition {
            Transition::Opened { previous, failure } => {
                metrics::record_circuit_transition(downstream, CircuitState::Open);
                fire(|| self.observer.on_circuit_opened(downstream, previous, &failure));
            }
            Transition::HalfOpened => {
                metrics::record_circuit_transition(downstream, CircuitState::HalfOpen);
                fire(|| self.observer.on_circuit_half_open(downstream));
            }
            Transition::Closed => {
                metrics::record_circuit_transition(downstream, CircuitState::Closed);
                fire(|| self.observer.on_circuit_closed(downstream));
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerCore> {
        // Core is consistent after every statement, so a poisoned lock is still usable.
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission for one attempt. Report the classified outcome with `record`;
/// dropping without recording leaves the breaker's health untouched.
#[derive(Debug)]
pub struct AttemptPermit {
    breaker: Arc<CircuitBreaker>,
    epoch: u64,
    probe: bool,
    settled: bool,
}

impl AttemptPermit {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record(mut self, outcome: &Outcome) {
        self.settled = true;
        self.breaker.on_outcome(self.epoch, self.probe, outcome);
    }
}

impl Drop for AttemptPermit {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe(self.epoch);
        }
    }
}
