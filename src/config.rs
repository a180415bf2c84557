//! Client configuration and construction-time validation.

use std::time::Duration;
use thiserror::Error;

/// Tuning for [`ChatClient`](crate::ChatClient).
///
/// [`ChatClientConfig::new`] fills in the deployment defaults; override
/// individual fields as needed before building the client.
#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    /// Chat service origin, e.g. `http://chat-svc:8080`. Required.
    pub base_url: String,
    /// Per-attempt transport timeout.
    pub request_timeout: Duration,
    /// Retries after the first attempt; 3 means up to four attempts.
    pub max_retries: usize,
    /// First backoff delay.
    pub initial_delay: Duration,
    /// Backoff multiplier between consecutive delays.
    pub retry_backoff: f64,
    /// Ceiling on any single backoff delay.
    pub max_delay: Duration,
    /// Jitter as a fraction of each delay, in `[0, 1]`.
    pub jitter_fraction: f64,
    /// Master switch for the circuit breaker.
    pub breaker_enabled: bool,
    /// Consecutive failures before the breaker opens.
    pub breaker_threshold: usize,
    /// How long the breaker stays open before probing.
    pub breaker_reset_timeout: Duration,
}

impl ChatClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            retry_backoff: 2.0,
            max_delay: Duration::from_secs(30),
            jitter_fraction: 0.1,
            breaker_enabled: true,
            breaker_threshold: 5,
            breaker_reset_timeout: Duration::from_secs(30),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request_timeout"));
        }
        if self.initial_delay.is_zero() {
            return Err(ConfigError::ZeroDuration("initial_delay"));
        }
        if self.breaker_reset_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("breaker_reset_timeout"));
        }
        if !self.retry_backoff.is_finite() || self.retry_backoff < 1.0 {
            return Err(ConfigError::MultiplierBelowOne(self.retry_backoff));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::MaxDelayBelowInitial {
                max: self.max_delay,
                initial: self.initial_delay,
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(ConfigError::JitterOutOfRange(self.jitter_fraction));
        }
        if self.breaker_threshold == 0 {
            return Err(ConfigError::ZeroBreakerThreshold);
        }
        Ok(())
    }

    /// Total attempt budget, including the first try.
    pub(crate) fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("base_url must not be empty")]
    EmptyBaseUrl,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("retry_backoff must be a finite multiplier >= 1.0 (got {0})")]
    MultiplierBelowOne(f64),
    #[error("max_delay {max:?} is below initial_delay {initial:?}")]
    MaxDelayBelowInitial { max: Duration, initial: Duration },
    #[error("jitter_fraction must lie in [0, 1] (got {0})")]
    JitterOutOfRange(f64),
    #[error("breaker_threshold must be at least 1")]
    ZeroBreakerThreshold,
    #[error("failed to construct the HTTP transport: {0}")]
    HttpClient(String),
}
