//! Jittered exponential backoff schedule for download retries.

use std::time::Duration;

/// Exponential backoff with multiplicative growth, a hard cap, and
/// ±25 % jitter per delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Growth factor applied per retry.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub cap: Duration,
    /// Jitter fraction (0.25 means ±25 %).
    pub jitter: f64,
    /// Maximum number of retries before giving up.
    pub max_retries: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            multiplier: 2.0,
            cap: Duration::from_secs(60),
            jitter: 0.25,
            max_retries: 5,
        }
    }
}

impl Backoff {
    /// Returns the jittered delay before retry `attempt` (1-based), or
    /// `None` once the retry budget is exhausted.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }

        let exponent = self.multiplier.powi(i32::try_from(attempt - 1).unwrap_or(i32::MAX));
        let base = self.initial.as_secs_f64() * exponent;
        let capped = base.min(self.cap.as_secs_f64());

        // rand::random::<f64>() is uniform in [0, 1): spread it over
        // [1 - jitter, 1 + jitter].
        let factor = 1.0 - self.jitter + rand::random::<f64>() * self.jitter * 2.0;

        Some(Duration::from_secs_f64(capped * factor))
    }
}
