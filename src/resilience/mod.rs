//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a downstream:
//!     → pipeline.rs (entry point, composes the policies below)
//!     → circuit_breaker.rs (gate every attempt, fail fast when open)
//!     → timeouts.rs (bound each attempt)
//!     → outcome.rs (classify the attempt once)
//!     → circuit_breaker.rs (record the outcome)
//!     → retries.rs + backoff.rs (retry transient failures after a delay)
//! ```
//!
//! # Design Decisions
//! - Classification happens once per attempt; retry and breaker both read it
//! - Breaker state is owned by the pipeline, never global
//! - Open → Half-Open is checked lazily on the next call against a clock
//! - Observability hooks are fire-and-forget

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod hooks;
pub mod outcome;
pub mod pipeline;
pub mod retries;
pub mod timeouts;

pub use backoff::DelayStrategy;
pub use circuit_breaker::{BreakerPolicy, BreakerSnapshot, BrokenCircuit, CircuitBreaker, CircuitState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use hooks::{ObserverSet, PolicyObserver, TracingObserver};
pub use outcome::{FailureInfo, Outcome, OutcomeClassifier};
pub use pipeline::{AttemptFailure, Pipeline, PipelineBuilder, PolicyError};
pub use retries::RetryPolicy;
