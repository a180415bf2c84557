//! Jitter applied to backoff delays so concurrent callers don't retry in
//! lockstep.

use rand::Rng;
use std::time::Duration;

/// Jitter strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// Use the exact backoff delay.
    None,
    /// Perturb the delay by a uniform sample in `±fraction · delay`.
    Proportional(f64),
}

impl Jitter {
    /// Proportional jitter with the fraction clamped into `[0, 1]`, so the
    /// perturbed delay can never go negative.
    pub fn proportional(fraction: f64) -> Self {
        if fraction.is_finite() {
            Jitter::Proportional(fraction.clamp(0.0, 1.0))
        } else {
            Jitter::None
        }
    }

    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rand::rng())
    }

    /// Apply with a caller-supplied RNG, for deterministic tests.
    pub fn apply_with_rng<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        match *self {
            Jitter::None => delay,
            Jitter::Proportional(fraction) => {
                let fraction = fraction.clamp(0.0, 1.0);
                if delay.is_zero() || fraction == 0.0 {
                    return delay;
                }
                let spread = delay.as_secs_f64() * fraction;
                let offset = rng.random_range(-spread..=spread);
                Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
            }
        }
    }
}
