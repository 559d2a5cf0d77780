//! Requeue delays for failed reconciliations.
//!
//! The reconciler itself never retries. The dispatcher asks this module how
//! long to wait before the next attempt, based on how many consecutive
//! failures an object has seen. Delays grow exponentially, are capped, and
//! carry jitter so many failing clusters do not requeue in lockstep.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff settings
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Multiplier applied per additional consecutive failure
    pub backoff_multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Create a config with the given bounds and the default multiplier
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Delay before retrying after `failures` consecutive failures (1-based).
    ///
    /// `failures == 0` is treated like the first failure.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// `delay_for` with 0.5x to 1.5x jitter, still capped at `max_delay`
    pub fn jittered_delay_for(&self, failures: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let secs = self.delay_for(failures).as_secs_f64() * jitter;
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}
