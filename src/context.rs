//! Caller-scoped cancellation and deadline carried by every public call.

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Cancellation signal plus optional deadline for one logical call.
///
/// Cloning shares the underlying token: cancelling any clone cancels them
/// all. The default context has no deadline and never fires on its own.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose deadline is `budget` from now.
    pub fn with_timeout(budget: Duration) -> Self {
        Self { cancel: CancellationToken::new(), deadline: Some(Instant::now() + budget) }
    }

    /// Signal cancellation to every clone of this context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once `cancel` was called or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Time left until the deadline. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Resolves when the context is cancelled or its deadline passes. Pends
    /// forever on an unbounded, uncancelled context, so it is only useful
    /// inside `select!`.
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }
}
