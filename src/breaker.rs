//! Circuit breaker fencing a single downstream origin.
//!
//! One breaker per origin: every call shares it, so a sustained outage
//! observed by one caller fails the rest fast. The state machine is built
//! on atomics; a gate entry, a success, and a failure each resolve with a
//! single CAS, and the transition hook runs with no lock held.

use crate::{Clock, MonotonicClock};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

/// Externally observable breaker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            OPEN => CircuitState::Open,
            HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive recorded failures before the breaker opens.
    pub failure_threshold: usize,
    /// How long the breaker stays open before admitting a probe.
    pub reset_timeout: Duration,
    /// When false the breaker is a pass-through and never transitions.
    pub enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, reset_timeout: Duration::from_secs(30), enabled: true }
    }
}

/// Rejection or pass-through error from a gated call.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The breaker refused to run the operation.
    Rejected { failures: usize, open_for: Duration },
    /// The operation ran and failed with its own error.
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, BreakerError::Rejected { .. })
    }
}

// The probe needs no slot of its own: winning the Open→HalfOpen CAS admits
// it, and the phase only leaves HalfOpen through that probe's outcome, so a
// second probe can never slip in.
struct BreakerShared {
    phase: AtomicU8,
    consecutive_failures: AtomicUsize,
    opened_at_millis: AtomicU64,
}

type TransitionHook = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

pub struct CircuitBreaker<E> {
    shared: Arc<BreakerShared>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    records_failure: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    on_transition: Option<TransitionHook>,
}

impl<E> Clone for CircuitBreaker<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
            records_failure: Arc::clone(&self.records_failure),
            on_transition: self.on_transition.clone(),
        }
    }
}

impl<E> std::fmt::Debug for CircuitBreaker<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E> CircuitBreaker<E> {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            shared: Arc::new(BreakerShared {
                phase: AtomicU8::new(CLOSED),
                consecutive_failures: AtomicUsize::new(0),
                opened_at_millis: AtomicU64::new(0),
            }),
            config,
            clock: Arc::new(MonotonicClock::default()),
            records_failure: Arc::new(|_| true),
            on_transition: None,
        }
    }

    /// Swap the clock, for deterministic recovery-timing tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Decide which operation errors count as failures. Errors the predicate
    /// rejects leave the failure counter untouched.
    pub fn records_failure<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.records_failure = Arc::new(predicate);
        self
    }

    /// Hook invoked once per transition with `(from, to)`, immediately after
    /// the CAS that performed it. No breaker state is locked while it runs,
    /// so the hook may itself issue calls through this breaker.
    pub fn on_transition<F>(mut self, hook: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_transition = Some(Arc::new(hook));
        self
    }

    /// Current phase; always `Closed` when the breaker is disabled.
    pub fn state(&self) -> CircuitState {
        if !self.config.enabled {
            return CircuitState::Closed;
        }
        CircuitState::from_raw(self.shared.phase.load(Ordering::Acquire))
    }

    /// Gate one operation. The operation's final result decides the breaker's
    /// success/failure accounting; whatever retrying happens inside it is
    /// invisible here.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, BreakerError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        if !self.config.enabled {
            return operation().await.map_err(BreakerError::Inner);
        }

        let admitted_as_probe = self.admit()?;
        let result = operation().await;

        match result {
            Ok(value) => {
                self.on_success(admitted_as_probe);
                Ok(value)
            }
            Err(error) => {
                if (self.records_failure)(&error) {
                    self.on_failure(admitted_as_probe);
                } else if admitted_as_probe {
                    // An abandoned probe proves nothing; return to Open and
                    // let the next caller probe again.
                    self.reopen_after_probe();
                }
                Err(BreakerError::Inner(error))
            }
        }
    }

    /// Returns whether the admitted call is the half-open probe, or the
    /// rejection to hand back.
    fn admit(&self) -> Result<bool, BreakerError<E>> {
        loop {
            match self.shared.phase.load(Ordering::Acquire) {
                CLOSED => return Ok(false),
                OPEN => {
                    let opened_at = self.shared.opened_at_millis.load(Ordering::Acquire);
                    let elapsed = self.clock.now_millis().saturating_sub(opened_at);
                    if elapsed < self.config.reset_timeout.as_millis() as u64 {
                        return Err(self.rejection(elapsed));
                    }
                    match self.shared.phase.compare_exchange(
                        OPEN,
                        HALF_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            tracing::info!("circuit breaker half-open, admitting probe");
                            self.notify(CircuitState::Open, CircuitState::HalfOpen);
                            return Ok(true);
                        }
                        // Lost the race; re-read the phase and try again.
                        Err(_) => continue,
                    }
                }
                HALF_OPEN => {
                    return Err(self.rejection(0));
                }
                _ => unreachable!("invalid breaker phase"),
            }
        }
    }

    fn on_success(&self, was_probe: bool) {
        if was_probe {
            if self
                .shared
                .phase
                .compare_exchange(HALF_OPEN, CLOSED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.shared.consecutive_failures.store(0, Ordering::Release);
                self.shared.opened_at_millis.store(0, Ordering::Release);
                tracing::info!("circuit breaker closed after successful probe");
                self.notify(CircuitState::HalfOpen, CircuitState::Closed);
            }
            return;
        }

        if self.shared.phase.load(Ordering::Acquire) == CLOSED {
            self.shared.consecutive_failures.store(0, Ordering::Release);
        }
    }

    fn on_failure(&self, was_probe: bool) {
        let failures = self.shared.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;

        if was_probe {
            self.reopen_after_probe();
            tracing::warn!(failures, "circuit breaker probe failed, reopening");
            return;
        }

        if self.shared.phase.load(Ordering::Acquire) == CLOSED
            && failures >= self.config.failure_threshold
        {
            // Stamp the open time first so a racing gate entry never pairs
            // the Open phase with a stale timestamp.
            self.shared.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
            if self
                .shared
                .phase
                .compare_exchange(CLOSED, OPEN, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                tracing::error!(
                    failures,
                    threshold = self.config.failure_threshold,
                    "circuit breaker opened"
                );
                self.notify(CircuitState::Closed, CircuitState::Open);
            }
        }
    }

    fn reopen_after_probe(&self) {
        self.shared.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
        if self
            .shared
            .phase
            .compare_exchange(HALF_OPEN, OPEN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.notify(CircuitState::HalfOpen, CircuitState::Open);
        }
    }

    fn rejection(&self, open_for_millis: u64) -> BreakerError<E> {
        BreakerError::Rejected {
            failures: self.shared.consecutive_failures.load(Ordering::Acquire),
            open_for: Duration::from_millis(open_for_millis),
        }
    }

    fn notify(&self, from: CircuitState, to: CircuitState) {
        if let Some(hook) = &self.on_transition {
            hook(from, to);
        }
    }
}
