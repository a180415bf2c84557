//! Resilient HTTP client for the chat service.
//!
//! Composition per call: the breaker gates whether we even try, the retry
//! loop decides how hard we try, and one HTTP round-trip happens per
//! attempt. The breaker sees a single success or failure for the whole
//! retried call, so transient noise absorbed by the retry loop cannot trip
//! it; only a fully failed call counts.

use crate::breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig};
use crate::messages::ErrorBody;
use crate::{
    Backoff, BackoffPacer, CallContext, ChatClientConfig, ChatError, CircuitState, Clock,
    ConfigError, Jitter, MessagesPage, RetryError, RetryPolicy, TokenHolder,
};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Largest page the messages endpoint serves.
pub const MAX_PAGE_LIMIT: u32 = 100;

const USER_AGENT: &str = concat!("chatlink/", env!("CARGO_PKG_VERSION"));

/// Authenticated, retrying, breaker-gated client for the chat service.
///
/// One instance per downstream origin. Cloning is cheap; clones share the
/// token register and the breaker, so a rotation or an opened circuit is
/// visible to all of them.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    token: TokenHolder,
    retry: RetryPolicy<ChatError>,
    breaker: CircuitBreaker<ChatError>,
    request_timeout: Duration,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.inner.base_url)
            .field("circuit_state", &self.circuit_state())
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    pub fn builder(config: ChatClientConfig) -> ChatClientBuilder {
        ChatClientBuilder {
            config,
            token: String::new(),
            pacer: None,
            clock: None,
            on_transition: None,
        }
    }

    /// Fetch the newest messages for a conversation, newest first.
    ///
    /// `limit` is clamped into `[1, MAX_PAGE_LIMIT]`.
    pub async fn fetch_recent_messages(
        &self,
        ctx: &CallContext,
        conversation_id: &str,
        limit: u32,
    ) -> Result<MessagesPage, ChatError> {
        self.fetch_messages_page(ctx, conversation_id, limit, None).await
    }

    /// Same fetch, continuing from an opaque `next_cursor` of a prior page.
    pub async fn fetch_messages_page(
        &self,
        ctx: &CallContext,
        conversation_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<MessagesPage, ChatError> {
        validate_conversation_id(conversation_id)?;
        if self.inner.token.get().is_empty() {
            tracing::warn!(conversation_id, "dropping fetch: no bearer token configured");
            return Err(ChatError::AuthMissing);
        }
        let limit = clamp_limit(limit);
        let url = format!(
            "{}/api/v1/chat/conversations/{}/messages",
            self.inner.base_url, conversation_id
        );

        let outcome = self
            .inner
            .breaker
            .execute(|| async {
                self.inner
                    .retry
                    .execute(ctx, |attempt| {
                        self.attempt_fetch(ctx, &url, conversation_id, limit, cursor, attempt)
                    })
                    .await
                    .map_err(flatten_retry)
            })
            .await;

        match outcome {
            Ok(page) => Ok(page),
            Err(BreakerError::Rejected { failures, open_for }) => {
                tracing::warn!(conversation_id, failures, "fetch rejected: circuit breaker open");
                Err(ChatError::BreakerOpen { failures, open_for })
            }
            Err(BreakerError::Inner(error)) => Err(error),
        }
    }

    /// Probe the chat service's health endpoint: one attempt, no retry,
    /// gated by the breaker. Sends the bearer header when a token is
    /// present but does not require one.
    pub async fn health(&self, ctx: &CallContext) -> Result<(), ChatError> {
        let url = format!("{}/health", self.inner.base_url);

        let outcome = self
            .inner
            .breaker
            .execute(|| async {
                let limit = self.per_attempt_timeout(ctx)?;
                let mut request =
                    self.inner.http.get(&url).header(ACCEPT, "application/json").timeout(limit);
                let token = self.inner.token.get();
                if !token.is_empty() {
                    request = request.bearer_auth(token.as_str());
                }

                let sent_at = Instant::now();
                let response = tokio::select! {
                    biased;
                    _ = ctx.cancelled() => return Err(ChatError::Cancelled),
                    response = request.send() => response,
                };
                let response =
                    response.map_err(|error| classify_send_error(error, sent_at.elapsed(), limit))?;

                let status = response.status();
                if status.is_success() {
                    Ok(())
                } else {
                    Err(ChatError::Http { status, message: None })
                }
            })
            .await;

        match outcome {
            Ok(()) => Ok(()),
            Err(BreakerError::Rejected { failures, open_for }) => {
                Err(ChatError::BreakerOpen { failures, open_for })
            }
            Err(BreakerError::Inner(error)) => Err(error),
        }
    }

    /// Rotate the bearer token; visible to every subsequent request build,
    /// including attempts of calls already in flight.
    pub fn update_token(&self, token: impl Into<String>) {
        self.inner.token.set(token);
    }

    /// Current breaker phase, for monitoring.
    pub fn circuit_state(&self) -> CircuitState {
        self.inner.breaker.state()
    }

    /// One HTTP round-trip plus its structured log event.
    async fn attempt_fetch(
        &self,
        ctx: &CallContext,
        url: &str,
        conversation_id: &str,
        limit: u32,
        cursor: Option<&str>,
        attempt: usize,
    ) -> Result<MessagesPage, ChatError> {
        let started = Instant::now();
        let result = self.round_trip(ctx, url, limit, cursor).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(page) => tracing::debug!(
                conversation_id,
                attempt,
                elapsed_ms,
                fetched = page.messages.len(),
                outcome = "success",
                "chat fetch attempt"
            ),
            Err(error) => tracing::warn!(
                conversation_id,
                attempt,
                elapsed_ms,
                outcome = error.kind(),
                "chat fetch attempt failed"
            ),
        }
        result
    }

    async fn round_trip(
        &self,
        ctx: &CallContext,
        url: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<MessagesPage, ChatError> {
        // Re-read the register on every attempt so a rotation mid-call is
        // picked up by the next request.
        let token = self.inner.token.get();
        if token.is_empty() {
            return Err(ChatError::AuthMissing);
        }
        let limit_timeout = self.per_attempt_timeout(ctx)?;

        let mut request = self
            .inner
            .http
            .get(url)
            .query(&[("limit", limit.to_string())])
            .bearer_auth(token.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .timeout(limit_timeout);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let sent_at = Instant::now();
        // Dropping the send future on cancellation tears the connection down.
        let response = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(ChatError::Cancelled),
            response = request.send() => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(error) => return Err(classify_send_error(error, sent_at.elapsed(), limit_timeout)),
        };

        let status = response.status();
        if status.is_success() {
            let body = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(ChatError::Cancelled),
                body = response.bytes() => body,
            };
            let body = body
                .map_err(|error| classify_send_error(error, sent_at.elapsed(), limit_timeout))?;
            return serde_json::from_slice::<MessagesPage>(&body)
                .map_err(|error| ChatError::Protocol(error.to_string()));
        }

        // Non-2xx: surface the structured error body when one decodes.
        let message = match response.bytes().await {
            Ok(body) => serde_json::from_slice::<ErrorBody>(&body).ok().and_then(ErrorBody::detail),
            Err(_) => None,
        };
        Err(ChatError::Http { status, message })
    }

    /// Per-attempt transport budget: the configured timeout, shrunk to the
    /// context's remaining deadline when that is earlier.
    fn per_attempt_timeout(&self, ctx: &CallContext) -> Result<Duration, ChatError> {
        match ctx.remaining() {
            None => Ok(self.inner.request_timeout),
            Some(remaining) if remaining.is_zero() => Err(ChatError::Cancelled),
            Some(remaining) => Ok(self.inner.request_timeout.min(remaining)),
        }
    }
}

pub struct ChatClientBuilder {
    config: ChatClientConfig,
    token: String,
    pacer: Option<Arc<dyn BackoffPacer>>,
    clock: Option<Arc<dyn Clock>>,
    on_transition: Option<Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>>,
}

impl ChatClientBuilder {
    /// Initial bearer token. May be left unset; fetches then fail with
    /// `AuthMissing` until a rotation supplies one.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Swap the backoff pacer, for tests asserting the retry schedule.
    pub fn pacer(mut self, pacer: Arc<dyn BackoffPacer>) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Swap the breaker clock, for tests driving the recovery window.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Observe breaker transitions, e.g. to export a gauge.
    pub fn on_breaker_transition<F>(mut self, hook: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_transition = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<ChatClient, ConfigError> {
        self.config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| ConfigError::HttpClient(error.to_string()))?;

        let mut retry_builder = RetryPolicy::builder()
            .max_attempts(self.config.max_attempts())
            .backoff(
                Backoff::exponential(self.config.initial_delay)
                    .with_multiplier(self.config.retry_backoff)
                    .with_max(self.config.max_delay),
            )
            .jitter(if self.config.jitter_fraction == 0.0 {
                Jitter::None
            } else {
                Jitter::proportional(self.config.jitter_fraction)
            })
            .should_retry(ChatError::is_retryable);
        if let Some(pacer) = self.pacer {
            retry_builder = retry_builder.pacer(pacer);
        }

        let mut breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: self.config.breaker_threshold,
            reset_timeout: self.config.breaker_reset_timeout,
            enabled: self.config.breaker_enabled,
        })
        .records_failure(ChatError::counts_toward_breaker);
        if let Some(clock) = self.clock {
            breaker = breaker.with_clock(clock);
        }
        if let Some(hook) = self.on_transition {
            breaker = breaker.on_transition(move |from, to| hook(from, to));
        }

        Ok(ChatClient {
            inner: Arc::new(ClientInner {
                http,
                base_url: self.config.base_url.trim_end_matches('/').to_string(),
                token: TokenHolder::new(self.token),
                retry: retry_builder.build(),
                breaker,
                request_timeout: self.config.request_timeout,
            }),
        })
    }
}

fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_PAGE_LIMIT)
}

fn validate_conversation_id(id: &str) -> Result<(), ChatError> {
    if id.is_empty() {
        return Err(ChatError::Precondition("conversation id must not be empty".into()));
    }
    if id.chars().any(|c| matches!(c, '/' | '?' | '#') || c.is_whitespace()) {
        return Err(ChatError::Precondition(format!(
            "conversation id {id:?} contains URL-unsafe characters"
        )));
    }
    Ok(())
}

fn flatten_retry(error: RetryError<ChatError>) -> ChatError {
    match error {
        RetryError::Exhausted { attempts, last } => {
            ChatError::Exhausted { attempts, last: Box::new(last) }
        }
        RetryError::Fatal { error, .. } => error,
        RetryError::Cancelled { .. } => ChatError::Cancelled,
    }
}

fn classify_send_error(error: reqwest::Error, elapsed: Duration, limit: Duration) -> ChatError {
    if error.is_timeout() {
        ChatError::Timeout { elapsed, limit }
    } else {
        ChatError::Transport { reason: error.to_string() }
    }
}
