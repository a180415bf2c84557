//! Error taxonomy surfaced to callers of the chat client.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Closed set of failures a chat-service call can surface.
///
/// Callers match on the variant. No variant carries the bearer token or
/// message contents.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The token register was empty at request-build time. Nothing was sent.
    #[error("bearer token is empty; request not sent")]
    AuthMissing,

    /// Invalid argument from the caller.
    #[error("invalid argument: {0}")]
    Precondition(String),

    /// The caller's context was cancelled or its deadline passed.
    #[error("call cancelled by caller")]
    Cancelled,

    /// The circuit breaker rejected the call without sending anything.
    #[error("circuit breaker open after {failures} consecutive failures (open for {open_for:?})")]
    BreakerOpen { failures: usize, open_for: Duration },

    /// One attempt exceeded its transport deadline.
    #[error("attempt timed out after {elapsed:?} (limit {limit:?})")]
    Timeout { elapsed: Duration, limit: Duration },

    /// Connection-level failure: reset, DNS, TLS.
    #[error("transport failure: {reason}")]
    Transport { reason: String },

    /// The chat service answered with a non-2xx status.
    #[error("chat service returned {status}")]
    Http { status: StatusCode, message: Option<String> },

    /// A 2xx response whose body did not decode.
    #[error("undecodable response body: {0}")]
    Protocol(String),

    /// Every attempt failed retryably; `last` is the final attempt's error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<ChatError>,
    },
}

impl ChatError {
    /// Whether the retry engine may try again after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::Timeout { .. } | ChatError::Transport { .. } => true,
            ChatError::Http { status, .. } => {
                matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }

    /// Whether this outcome is evidence that the downstream is unhealthy.
    ///
    /// Calls that were abandoned or never sent are not: the downstream was
    /// not observed to fail.
    pub fn counts_toward_breaker(&self) -> bool {
        match self {
            ChatError::AuthMissing
            | ChatError::Precondition(_)
            | ChatError::Cancelled
            | ChatError::BreakerOpen { .. } => false,
            ChatError::Exhausted { last, .. } => last.counts_toward_breaker(),
            _ => true,
        }
    }

    pub fn is_breaker_open(&self) -> bool {
        matches!(self, ChatError::BreakerOpen { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChatError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ChatError::Timeout { .. })
    }

    /// Downstream status, if this error (or the one it wraps) carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ChatError::Http { status, .. } => Some(*status),
            ChatError::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Attempts made before the retry loop gave up, when it counted them.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            ChatError::Exhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Stable label for log events.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::AuthMissing => "auth_missing",
            ChatError::Precondition(_) => "precondition",
            ChatError::Cancelled => "cancelled",
            ChatError::BreakerOpen { .. } => "breaker_open",
            ChatError::Timeout { .. } => "timeout",
            ChatError::Transport { .. } => "transport",
            ChatError::Http { .. } => "http",
            ChatError::Protocol(_) => "protocol",
            ChatError::Exhausted { .. } => "exhausted",
        }
    }
}
