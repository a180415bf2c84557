//! Bounded retry with exponential backoff and jitter.
//!
//! The engine is deliberately stateless: policies are cheap to clone and a
//! single policy may serve any number of concurrent calls. Whether an error
//! is worth retrying is the caller's business, supplied as a predicate.

use crate::{Backoff, BackoffPacer, CallContext, Jitter, TimerPacer, WaitOutcome};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a retry loop that did not produce a success.
///
/// Every variant carries the number of attempts actually made.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The final attempt failed with a retryable error.
    Exhausted { attempts: usize, last: E },
    /// A non-retryable error ended the loop immediately.
    Fatal { attempts: usize, error: E },
    /// The caller's context fired before the next attempt could start. The
    /// aborted wait does not count as an attempt.
    Cancelled { attempts: usize },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::Fatal { attempts, .. }
            | RetryError::Cancelled { attempts } => *attempts,
        }
    }
}

pub struct RetryPolicy<E> {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    pacer: Arc<dyn BackoffPacer>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            should_retry: Arc::clone(&self.should_retry),
            pacer: Arc::clone(&self.pacer),
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("should_retry", &"<predicate>")
            .field("pacer", &self.pacer)
            .finish()
    }
}

impl<E> RetryPolicy<E> {
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Run `operation` until it succeeds, fails non-retryably, exhausts the
    /// attempt budget, or the context fires.
    ///
    /// The operation receives the 1-indexed attempt number. It must be safe
    /// to invoke more than once; idempotence is the caller's responsibility.
    /// Backoff waits go through the pacer, which races them against `ctx`,
    /// so cancellation is observed without waiting out the current delay.
    pub async fn execute<T, Fut, Op>(
        &self,
        ctx: &CallContext,
        mut operation: Op,
    ) -> Result<T, RetryError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnMut(usize) -> Fut,
    {
        for attempt in 1..=self.max_attempts {
            if ctx.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt - 1 });
            }

            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if !(self.should_retry)(&error) => {
                    return Err(RetryError::Fatal { attempts: attempt, error });
                }
                Err(error) => {
                    if attempt == self.max_attempts {
                        return Err(RetryError::Exhausted { attempts: attempt, last: error });
                    }

                    let delay = self.jitter.apply(self.backoff.delay(attempt));
                    tracing::debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, backing off before the next one"
                    );
                    if self.pacer.pause(delay, ctx).await == WaitOutcome::Cancelled {
                        return Err(RetryError::Cancelled { attempts: attempt });
                    }
                }
            }
        }

        unreachable!("retry loop always returns from within its body")
    }
}

pub struct RetryPolicyBuilder<E> {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    pacer: Arc<dyn BackoffPacer>,
}

impl<E> RetryPolicyBuilder<E> {
    pub fn new() -> Self {
        Self {
            max_attempts: 4,
            backoff: Backoff::exponential(Duration::from_millis(100)),
            jitter: Jitter::proportional(0.1),
            should_retry: Arc::new(|_| true),
            pacer: Arc::new(TimerPacer),
        }
    }

    /// Total attempt budget, including the first try. Values below 1 are
    /// treated as 1.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn pacer(mut self, pacer: Arc<dyn BackoffPacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn build(self) -> RetryPolicy<E> {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            should_retry: self.should_retry,
            pacer: self.pacer,
        }
    }
}

impl<E> Default for RetryPolicyBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}
