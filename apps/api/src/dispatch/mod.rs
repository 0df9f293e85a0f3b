//! Resilient dispatcher — one logical request to the completion provider.
//!
//! Absorbs 429 responses with bounded retry-with-backoff and translates
//! everything else into a small closed taxonomy. Retry policy, reproduced
//! exactly from the production behavior this service fronts:
//!
//! - only 429 is retried; 402, malformed payloads, and all other non-2xx
//!   statuses are terminal on the first occurrence;
//! - the provider's `Retry-After` header (seconds, when positive) takes
//!   priority over computed backoff;
//! - otherwise the delay is `min(30s, 2^attempt * 1s)` plus 0–500ms of random
//!   jitter so concurrent callers do not retry in lockstep.
//!
//! The dispatcher never consults the entitlement gate. Composition order
//! (gate check → build prompt → send → record usage on success) belongs to
//! the feature handler.

pub mod extract;
pub mod gemini;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

/// Parsed JSON extracted from the provider's reply. Opaque to this layer;
/// feature handlers destructure it further if they care.
pub type Payload = serde_json::Value;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

const BACKOFF_CAP_MS: u64 = 30_000;
const JITTER_MAX_MS: u64 = 500;

/// Terminal dispatch outcomes. Every variant ends the logical request; only
/// 429 responses are retried, and those surface here once retries run out.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("provider rate limited; retries exhausted")]
    RateLimited { retry_after: Option<u64> },

    #[error("provider credits exhausted")]
    ProviderQuotaExhausted,

    #[error("no JSON payload found in provider response")]
    MalformedResponse,

    #[error("provider error (status {status}): {body}")]
    ProviderError { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// One logical completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: String) -> Self {
        Self {
            prompt,
            temperature: 0.7,
        }
    }
}

/// Raw outcome of one HTTP attempt, normalized across providers.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub status: u16,
    /// `Retry-After` seconds, already validated as positive.
    pub retry_after: Option<u64>,
    pub body: String,
}

/// Seam between the retry loop and the provider wire format. The real
/// backend speaks Gemini over reqwest; tests substitute a scripted stub.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Performs one HTTP attempt. Transport failures (including the
    /// per-attempt timeout) are terminal and never retried.
    async fn execute(&self, request: &CompletionRequest) -> Result<ProviderReply, DispatchError>;

    /// Pulls the completion text out of the provider's 2xx envelope.
    fn completion_text(&self, body: &str) -> Option<String>;
}

#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn CompletionBackend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Performs one logical request with up to `max_retries` additional
    /// attempts after 429 responses.
    pub async fn send(
        &self,
        request: &CompletionRequest,
        max_retries: u32,
    ) -> Result<Payload, DispatchError> {
        let mut attempt: u32 = 0;
        loop {
            let reply = self.backend.execute(request).await?;

            match reply.status {
                200..=299 => {
                    let text = self
                        .backend
                        .completion_text(&reply.body)
                        .ok_or(DispatchError::MalformedResponse)?;
                    let payload = extract::first_json_payload(&text)
                        .ok_or(DispatchError::MalformedResponse)?;
                    debug!("Dispatch succeeded on attempt {}", attempt + 1);
                    return Ok(payload);
                }
                429 => {
                    if attempt == max_retries {
                        return Err(DispatchError::RateLimited {
                            retry_after: reply.retry_after,
                        });
                    }
                    let delay = retry_delay(attempt, reply.retry_after);
                    warn!(
                        "Provider rate limited (429). Retrying in {}ms (attempt {}/{})",
                        delay.as_millis(),
                        attempt + 1,
                        max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                402 => return Err(DispatchError::ProviderQuotaExhausted),
                status => {
                    return Err(DispatchError::ProviderError {
                        status,
                        body: reply.body,
                    })
                }
            }
        }
    }
}

/// Delay before re-attempting after the `attempt`-th 429 (zero-based).
/// A positive `Retry-After` from the provider wins over computed backoff.
fn retry_delay(attempt: u32, retry_after: Option<u64>) -> Duration {
    if let Some(secs) = retry_after {
        return Duration::from_secs(secs);
    }
    let base_ms = BACKOFF_CAP_MS.min(1000u64 << attempt.min(16));
    let jitter_ms = rand::thread_rng().gen_range(0..JITTER_MAX_MS);
    Duration::from_millis(base_ms + jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Scripted backend: pops one reply per call, counts calls.
    /// `completion_text` is the identity so test bodies stand in for the
    /// provider's extracted text directly.
    struct StubBackend {
        replies: Mutex<VecDeque<ProviderReply>>,
        calls: AtomicU32,
    }

    impl StubBackend {
        fn new(replies: Vec<ProviderReply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for StubBackend {
        async fn execute(
            &self,
            _request: &CompletionRequest,
        ) -> Result<ProviderReply, DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| DispatchError::Transport("stub script exhausted".to_string()))
        }

        fn completion_text(&self, body: &str) -> Option<String> {
            Some(body.to_string())
        }
    }

    fn ok(body: &str) -> ProviderReply {
        ProviderReply {
            status: 200,
            retry_after: None,
            body: body.to_string(),
        }
    }

    fn status(status: u16) -> ProviderReply {
        ProviderReply {
            status,
            retry_after: None,
            body: String::new(),
        }
    }

    fn rate_limited(retry_after: Option<u64>) -> ProviderReply {
        ProviderReply {
            status: 429,
            retry_after,
            body: String::new(),
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("prompt".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_through_429_then_succeeds() {
        let backend = StubBackend::new(vec![
            rate_limited(None),
            rate_limited(None),
            ok("Sure! Here is the result: {\"a\":1} Hope that helps"),
        ]);
        let dispatcher = Dispatcher::new(backend.clone());

        let started = Instant::now();
        let payload = dispatcher.send(&request(), 3).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(payload, json!({"a": 1}));
        assert_eq!(backend.calls(), 3);
        // Backoff: 1s + jitter, then 2s + jitter.
        assert!(elapsed >= Duration::from_secs(3), "elapsed: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "elapsed: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_after_retries_exhausted() {
        let backend = StubBackend::new(vec![
            rate_limited(None),
            rate_limited(None),
            rate_limited(None),
        ]);
        let dispatcher = Dispatcher::new(backend.clone());

        let result = dispatcher.send(&request(), 2).await;

        // Initial attempt + 2 retries.
        assert_eq!(backend.calls(), 3);
        assert!(matches!(result, Err(DispatchError::RateLimited { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_carries_last_retry_after() {
        let backend = StubBackend::new(vec![rate_limited(None), rate_limited(Some(7))]);
        let dispatcher = Dispatcher::new(backend.clone());

        let result = dispatcher.send(&request(), 1).await;

        assert_eq!(backend.calls(), 2);
        match result {
            Err(DispatchError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Some(7))
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_header_beats_computed_backoff() {
        let backend = StubBackend::new(vec![rate_limited(Some(5)), ok("{\"ok\":true}")]);
        let dispatcher = Dispatcher::new(backend.clone());

        let started = Instant::now();
        dispatcher.send(&request(), 3).await.unwrap();
        let elapsed = started.elapsed();

        // Computed backoff for attempt 0 would be under 1.5s; the header's
        // 5s must win, with no jitter added.
        assert!(elapsed >= Duration::from_secs(5), "elapsed: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(5500), "elapsed: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_quota_is_terminal_and_immediate() {
        let backend = StubBackend::new(vec![status(402)]);
        let dispatcher = Dispatcher::new(backend.clone());

        let started = Instant::now();
        let result = dispatcher.send(&request(), 3).await;

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(backend.calls(), 1);
        assert!(matches!(result, Err(DispatchError::ProviderQuotaExhausted)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_statuses_are_not_retried() {
        let backend = StubBackend::new(vec![ProviderReply {
            status: 500,
            retry_after: None,
            body: "internal".to_string(),
        }]);
        let dispatcher = Dispatcher::new(backend.clone());

        let result = dispatcher.send(&request(), 3).await;

        assert_eq!(backend.calls(), 1);
        match result {
            Err(DispatchError::ProviderError { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "internal");
            }
            other => panic!("expected ProviderError, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_body_is_malformed_not_retried() {
        let backend = StubBackend::new(vec![ok("I could not produce JSON, sorry.")]);
        let dispatcher = Dispatcher::new(backend.clone());

        let result = dispatcher.send(&request(), 3).await;

        assert_eq!(backend.calls(), 1);
        assert!(matches!(result, Err(DispatchError::MalformedResponse)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_fails_on_first_429() {
        let backend = StubBackend::new(vec![rate_limited(None)]);
        let dispatcher = Dispatcher::new(backend.clone());

        let started = Instant::now();
        let result = dispatcher.send(&request(), 0).await;

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(backend.calls(), 1);
        assert!(matches!(result, Err(DispatchError::RateLimited { .. })));
    }

    #[test]
    fn test_backoff_doubles_with_jitter() {
        for _ in 0..50 {
            let d0 = retry_delay(0, None).as_millis() as u64;
            let d2 = retry_delay(2, None).as_millis() as u64;
            assert!((1000..1500).contains(&d0), "attempt 0 delay: {d0}");
            assert!((4000..4500).contains(&d2), "attempt 2 delay: {d2}");
        }
    }

    #[test]
    fn test_backoff_caps_at_thirty_seconds() {
        for _ in 0..50 {
            let d = retry_delay(20, None).as_millis() as u64;
            assert!((30_000..30_500).contains(&d), "capped delay: {d}");
        }
    }

    #[test]
    fn test_retry_after_is_exact() {
        assert_eq!(retry_delay(0, Some(7)), Duration::from_secs(7));
        assert_eq!(retry_delay(5, Some(1)), Duration::from_secs(1));
    }
}
