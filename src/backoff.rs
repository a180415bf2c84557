//! Backoff schedule for the retry engine.

use std::time::Duration;

/// Exponential delay schedule with a ceiling.
///
/// The delay inserted after the `n`-th failed attempt (1-indexed) is
/// `min(max, initial · multiplier^(n − 1))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    initial: Duration,
    multiplier: f64,
    max: Duration,
}

impl Backoff {
    /// Doubling schedule starting at `initial`, capped at 30 seconds.
    pub fn exponential(initial: Duration) -> Self {
        Self { initial, multiplier: 2.0, max: Duration::from_secs(30) }
    }

    /// Fixed delay between attempts.
    pub fn constant(delay: Duration) -> Self {
        Self { initial: delay, multiplier: 1.0, max: delay }
    }

    /// Growth factor per attempt. Values below 1.0 are treated as 1.0.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 };
        self
    }

    /// Ceiling on any single delay.
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// Delay after the given 1-indexed attempt, saturating at the ceiling.
    pub fn delay(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
        let factor = self.multiplier.powi(exponent);
        if !factor.is_finite() {
            return self.max;
        }
        let scaled = self.initial.as_secs_f64() * factor;
        if !scaled.is_finite() || scaled >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}
