//! Retry delay computation with exponential backoff and jitter.

use rand::Rng;
use std::time::Duration;

/// Default backoff unit.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Retry policy configuration.
///
/// `delay(retries) = base * 2^retries + uniform[0, base)`. The exponential
/// term has no ceiling unless `max_delay` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Backoff unit, also the upper bound of the jitter
    pub base_delay: Duration,
    /// Optional clamp on the exponential term (jitter is added afterwards)
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Create an uncapped policy with the given backoff unit.
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: None,
        }
    }

    /// Clamp the exponential term.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Deterministic part of the delay: `base * 2^retries`, saturating at
    /// `Duration::MAX` and clamped to `max_delay` when configured.
    pub fn exponential(&self, retries: u32) -> Duration {
        let multiplier = 1u128 << retries.min(127);
        let nanos = self.base_delay.as_nanos().saturating_mul(multiplier);
        let delay = u64::try_from(nanos)
            .map(Duration::from_nanos)
            .unwrap_or(Duration::MAX);

        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Uniformly distributed jitter in `[0, base)`.
    pub fn jitter(&self) -> Duration {
        let bound = u64::try_from(self.base_delay.as_nanos()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(0..bound))
    }

    /// Calculate the delay before the next attempt of a task that has
    /// failed `retries` times.
    pub fn delay(&self, retries: u32) -> Duration {
        self.exponential(retries).saturating_add(self.jitter())
    }
}
