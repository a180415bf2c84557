#![forbid(unsafe_code)]

//! # chatlink
//!
//! Resilient client core for the chat service: authenticated message fetches
//! with bounded, jittered retries, a per-origin circuit breaker, and a
//! live-rotatable bearer token.
//!
//! The pieces compose in a fixed order. The breaker gates whether a call is
//! attempted at all; inside it, the retry engine runs one HTTP round-trip
//! per attempt; every request carries the token register's current value.
//! The breaker is fed one success or failure per public call — never per
//! attempt — so transient noise that retries absorb cannot trip it.
//!
//! ## Quick start
//!
//! ```no_run
//! use chatlink::{CallContext, ChatClient, ChatClientConfig};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), chatlink::ChatError> {
//! let client = ChatClient::builder(ChatClientConfig::new("http://chat-svc:8080"))
//!     .bearer_token("initial-jwt")
//!     .build()
//!     .expect("valid configuration");
//!
//! let ctx = CallContext::with_timeout(Duration::from_secs(5));
//! let page = client.fetch_recent_messages(&ctx, "c1", 50).await?;
//! println!("{} messages, newest first", page.messages.len());
//!
//! // Rotate the credential without rebuilding the client.
//! client.update_token("fresh-jwt");
//! # Ok(())
//! # }
//! ```
//!
//! Cancellation flows through [`CallContext`]: cancelling it aborts backoff
//! waits and tears down the in-flight request, and the abandoned call is
//! not charged against the breaker.

mod backoff;
mod breaker;
mod client;
mod clock;
mod config;
mod context;
mod error;
mod jitter;
mod messages;
mod pacer;
mod retry;
mod token;

pub use backoff::Backoff;
pub use breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{ChatClient, ChatClientBuilder, MAX_PAGE_LIMIT};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ChatClientConfig, ConfigError};
pub use context::CallContext;
pub use error::ChatError;
pub use jitter::Jitter;
pub use messages::{ErrorBody, Message, MessageType, MessagesPage};
pub use pacer::{BackoffPacer, RecordingPacer, TimerPacer, WaitOutcome};
pub use retry::{RetryError, RetryPolicy, RetryPolicyBuilder};
pub use token::TokenHolder;

pub mod prelude;
