//! Pacing of the waits between retry attempts.
//!
//! A backoff wait here is never a plain sleep: it races the caller's
//! [`CallContext`], because an abandoned call must stop waiting the moment
//! its context fires. Putting that race inside the seam keeps the retry
//! engine's cancellation contract identical whether the wait runs on the
//! tokio timer or is skipped entirely by a test pacer.

use crate::CallContext;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a backoff wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full delay elapsed.
    Elapsed,
    /// The caller's context fired first; the wait was abandoned.
    Cancelled,
}

/// Seam the retry engine hands every inter-attempt delay through.
#[async_trait]
pub trait BackoffPacer: Send + Sync + std::fmt::Debug {
    async fn pause(&self, delay: Duration, ctx: &CallContext) -> WaitOutcome;
}

/// Production pacer: the tokio timer raced against the caller's context.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimerPacer;

#[async_trait]
impl BackoffPacer for TimerPacer {
    async fn pause(&self, delay: Duration, ctx: &CallContext) -> WaitOutcome {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => WaitOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => WaitOutcome::Elapsed,
        }
    }
}

/// Test pacer: records each requested delay and returns without waiting,
/// while still honoring a context that has already fired. Tests assert the
/// backoff schedule against `recorded()` instead of the wall clock.
#[derive(Debug, Clone, Default)]
pub struct RecordingPacer {
    recorded: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays handed to `pause` so far, in order.
    pub fn recorded(&self) -> Vec<Duration> {
        self.recorded.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

#[async_trait]
impl BackoffPacer for RecordingPacer {
    async fn pause(&self, delay: Duration, ctx: &CallContext) -> WaitOutcome {
        self.recorded.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(delay);
        if ctx.is_cancelled() {
            WaitOutcome::Cancelled
        } else {
            WaitOutcome::Elapsed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timer_pacer_waits_out_the_delay_when_the_context_is_silent() {
        let ctx = CallContext::new();
        let started = std::time::Instant::now();

        let outcome = TimerPacer.pause(Duration::from_millis(50), &ctx).await;

        assert_eq!(outcome, WaitOutcome::Elapsed);
        // Small tolerance for timer granularity.
        assert!(started.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn timer_pacer_aborts_the_wait_when_the_context_fires() {
        let ctx = CallContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = TimerPacer.pause(Duration::from_secs(5), &ctx).await;

        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(1), "must not wait out the 5s delay");
    }

    #[tokio::test]
    async fn timer_pacer_returns_immediately_on_a_fired_context() {
        let ctx = CallContext::new();
        ctx.cancel();

        let outcome = TimerPacer.pause(Duration::from_secs(5), &ctx).await;
        assert_eq!(outcome, WaitOutcome::Cancelled);
    }

    #[tokio::test]
    async fn recording_pacer_captures_the_schedule_in_order() {
        let pacer = RecordingPacer::new();
        let ctx = CallContext::new();

        assert_eq!(pacer.pause(Duration::from_millis(100), &ctx).await, WaitOutcome::Elapsed);
        assert_eq!(pacer.pause(Duration::from_millis(200), &ctx).await, WaitOutcome::Elapsed);

        assert_eq!(
            pacer.recorded(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn recording_pacer_keeps_the_cancellation_contract() {
        let pacer = RecordingPacer::new();
        let ctx = CallContext::new();
        ctx.cancel();

        let outcome = pacer.pause(Duration::from_millis(100), &ctx).await;

        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert_eq!(pacer.recorded(), vec![Duration::from_millis(100)], "the request is still recorded");
    }
}
