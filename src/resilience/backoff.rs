//! Retry delay strategies.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

/// How long to wait after a failed attempt. `attempt` is 1-based: the number
/// of the attempt that just failed.
#[derive(Clone)]
pub enum DelayStrategy {
    /// Same delay regardless of attempt number.
    Fixed(Duration),
    /// Doubling delay from `base`, capped at `max`, with optional jitter.
    Exponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl DelayStrategy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        DelayStrategy::Custom(Arc::new(f))
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            DelayStrategy::Fixed(delay) => *delay,
            DelayStrategy::Exponential { base, max, jitter } => {
                let delay = exponential_delay(attempt, *base, *max);
                if *jitter {
                    with_jitter(delay)
                } else {
                    delay
                }
            }
            DelayStrategy::Custom(f) => f(attempt),
        }
    }
}

impl fmt::Debug for DelayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelayStrategy::Fixed(d) => f.debug_tuple("Fixed").field(d).finish(),
            DelayStrategy::Exponential { base, max, jitter } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("max", max)
                .field("jitter", jitter)
                .finish(),
            DelayStrategy::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

impl Default for DelayStrategy {
    fn default() -> Self {
        DelayStrategy::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(2),
            jitter: true,
        }
    }
}

/// `base * 2^(attempt-1)`, capped at `max`. Zero for attempt 0.
pub fn exponential_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u32.saturating_pow(attempt - 1);
    base.saturating_mul(factor).min(max)
}

/// Add 0-10% random jitter.
pub fn with_jitter(delay: Duration) -> Duration {
    let jitter_range = delay.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    delay + Duration::from_millis(jitter)
}
