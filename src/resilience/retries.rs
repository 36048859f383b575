//! Retry policy.
//!
//! # Responsibilities
//! - Bound the number of attempts per call
//! - Decide whether a classified outcome is worth another attempt
//! - Compute the wait before the next attempt
//!
//! # Design Decisions
//! - Only transient failures are retried
//! - A rejected attempt (open circuit) ends the call; retrying into an open
//!   circuit only adds load
//! - `max_attempts` of 0 or 1 means a single attempt

use std::time::Duration;

use crate::resilience::backoff::DelayStrategy;
use crate::resilience::outcome::Outcome;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: DelayStrategy,
}

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the outcome back to the caller.
    Stop,
    /// Wait, then try again.
    RetryAfter(Duration),
    /// Transient failure with no attempts left.
    Exhausted,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: DelayStrategy) -> Self {
        Self { max_attempts, delay }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, DelayStrategy::Fixed(Duration::ZERO))
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, DelayStrategy::Fixed(delay))
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay.delay_for_attempt(attempt)
    }

    /// `attempt` is the 1-based number of the attempt that produced `outcome`.
    pub fn decide(&self, attempt: u32, outcome: &Outcome) -> RetryDecision {
        match outcome {
            Outcome::Success | Outcome::PermanentFailure(_) => RetryDecision::Stop,
            Outcome::TransientFailure(_) if attempt < self.max_attempts() => {
                RetryDecision::RetryAfter(self.delay_for_attempt(attempt))
            }
            Outcome::TransientFailure(_) => RetryDecision::Exhausted,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, DelayStrategy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::outcome::FailureInfo;

    fn transient() -> Outcome {
        Outcome::TransientFailure(FailureInfo::Fault("connection refused".into()))
    }

    #[test]
    fn test_retries_until_budget_spent() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(10));
        for attempt in 1..5 {
            assert_eq!(
                policy.decide(attempt, &transient()),
                RetryDecision::RetryAfter(Duration::from_secs(10))
            );
        }
        assert_eq!(policy.decide(5, &transient()), RetryDecision::Exhausted);
    }

    #[test]
    fn test_zero_and_one_mean_pass_through() {
        for max in [0, 1] {
            let policy = RetryPolicy::fixed(max, Duration::from_millis(1));
            assert_eq!(policy.max_attempts(), 1);
            assert_eq!(policy.decide(1, &transient()), RetryDecision::Exhausted);
        }
    }

    #[test]
    fn test_success_and_permanent_stop() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(1, &Outcome::Success), RetryDecision::Stop);
        let permanent = Outcome::PermanentFailure(FailureInfo::Fault("bad request".into()));
        assert_eq!(policy.decide(1, &permanent), RetryDecision::Stop);
    }
}
