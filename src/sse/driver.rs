//! Streaming POST driver with single-flight sessions, timeout and cancellation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::event::{parse_line, ParsedLine, SseEvent};
use super::framing::LineBuffer;
use super::http::{request_headers, shared_client, status_to_error};
use crate::config::{get_streaming_config, StreamingMode};
use crate::error::StreamError;
use crate::storage::{KeyValueStore, AUTH_TOKEN_KEY};

/// Timeout applied when no request config is given.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(130);

/// Callbacks invoked while a stream is running.
///
/// Each callback is awaited before the next line is processed, so events
/// arrive in wire order.
#[async_trait]
pub trait StreamHandler: Send {
    async fn on_event(&mut self, event: SseEvent);

    /// Called once before the request is sent.
    async fn on_start(&mut self) {}

    /// Called when the server closes the body cleanly.
    async fn on_complete(&mut self) {}

    /// Called for transport and HTTP failures. Never called for cancellation or timeout.
    async fn on_error(&mut self, _error: &StreamError) {}
}

/// Per-request options.
#[derive(Debug, Clone, Builder)]
pub struct StreamRequestConfig {
    /// `Duration::ZERO` disables the timer.
    #[builder(default = DEFAULT_STREAM_TIMEOUT)]
    pub timeout: Duration,
    #[builder(default)]
    pub headers: Vec<(String, String)>,
    /// Send `Authorization: Bearer <token>` when a token is stored.
    #[builder(default = true)]
    pub include_auth: bool,
}

impl Default for StreamRequestConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STREAM_TIMEOUT,
            headers: Vec::new(),
            include_auth: true,
        }
    }
}

impl StreamRequestConfig {
    /// Defaults with the timeout taken from a streaming profile.
    pub fn for_mode(mode: StreamingMode) -> Self {
        Self {
            timeout: Duration::from_millis(get_streaming_config(mode).timeout_ms),
            ..Self::default()
        }
    }
}

/// Outcome of one [`SseStreamDriver::stream`] call.
#[derive(Debug, Default)]
pub struct StreamResult {
    pub success: bool,
    /// Cancelled, superseded or timed out.
    pub aborted: bool,
    pub timed_out: bool,
    /// At least one chunk or token event arrived before the stream ended.
    pub has_partial_content: bool,
    pub error: Option<StreamError>,
}

struct ActiveSession {
    id: u64,
    cancel: CancellationToken,
}

struct DriverInner {
    client: reqwest::Client,
    storage: Option<Arc<dyn KeyValueStore>>,
    active: Mutex<Option<ActiveSession>>,
    next_session: AtomicU64,
}

impl DriverInner {
    fn active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Issues streaming requests and dispatches parsed events.
///
/// At most one stream is active per driver; clones share that slot.
/// Starting a new stream cancels the previous one.
#[derive(Clone)]
pub struct SseStreamDriver {
    inner: Arc<DriverInner>,
}

impl fmt::Debug for SseStreamDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseStreamDriver")
            .field("storage", &self.inner.storage.as_ref().map(|_| ".."))
            .field("is_streaming", &self.is_streaming())
            .finish()
    }
}

impl Default for SseStreamDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the session slot on every exit path, including when the
/// `stream` future is dropped mid-flight.
struct SessionGuard<'a> {
    inner: &'a DriverInner,
    id: u64,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.inner.active();
        if active.as_ref().is_some_and(|s| s.id == self.id) {
            *active = None;
        }
    }
}

impl SseStreamDriver {
    pub fn new() -> Self {
        Self::with_parts(shared_client().clone(), None)
    }

    /// Driver that reads the bearer token from `storage`.
    pub fn with_storage(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::with_parts(shared_client().clone(), Some(storage))
    }

    pub fn with_parts(client: reqwest::Client, storage: Option<Arc<dyn KeyValueStore>>) -> Self {
        Self {
            inner: Arc::new(DriverInner {
                client,
                storage,
                active: Mutex::new(None),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Whether a stream is currently active on this driver.
    pub fn is_streaming(&self) -> bool {
        self.inner.active().is_some()
    }

    /// Abort the active stream, if any.
    pub fn cancel(&self) {
        if let Some(session) = self.inner.active().take() {
            debug!(session = session.id, "cancelling stream");
            session.cancel.cancel();
        }
    }

    fn begin_session(&self) -> (u64, CancellationToken) {
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let previous = self.inner.active().replace(ActiveSession {
            id,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            debug!(
                session = id,
                superseded = previous.id,
                "new stream supersedes active stream"
            );
            previous.cancel.cancel();
        }
        (id, cancel)
    }

    fn auth_token(&self) -> Option<String> {
        let storage = self.inner.storage.as_ref()?;
        match storage.get(AUTH_TOKEN_KEY) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "could not read auth token, sending request without it");
                None
            }
        }
    }

    /// POST `body` to `url` and dispatch each streamed event to `handler`.
    ///
    /// Never fails: errors, cancellation and timeout are reported through
    /// the returned [`StreamResult`].
    pub async fn stream<H>(
        &self,
        url: &str,
        body: &serde_json::Value,
        handler: &mut H,
        config: Option<StreamRequestConfig>,
    ) -> StreamResult
    where
        H: StreamHandler + ?Sized,
    {
        let config = config.unwrap_or_default();
        let (id, cancel) = self.begin_session();
        let guard = SessionGuard {
            inner: &self.inner,
            id,
        };
        debug!(session = id, url, timeout_ms = config.timeout.as_millis() as u64, "stream started");

        let mut has_partial_content = false;
        let outcome = {
            let run = self.run(url, body, handler, &config, &mut has_partial_content);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(StreamError::Aborted),
                _ = expire(config.timeout) => {
                    Err(StreamError::Timeout(config.timeout.as_millis() as u64))
                }
                result = run => result,
            }
        };

        let result = match outcome {
            Ok(()) => {
                debug!(session = id, has_partial_content, "stream completed");
                StreamResult {
                    success: true,
                    has_partial_content,
                    ..Default::default()
                }
            }
            Err(err) if err.is_abort() => {
                let timed_out = matches!(err, StreamError::Timeout(_));
                debug!(session = id, timed_out, has_partial_content, "stream aborted");
                StreamResult {
                    aborted: true,
                    timed_out,
                    has_partial_content,
                    error: Some(err),
                    ..Default::default()
                }
            }
            Err(err) => {
                warn!(session = id, error = %err, "stream failed");
                handler.on_error(&err).await;
                StreamResult {
                    has_partial_content,
                    error: Some(err),
                    ..Default::default()
                }
            }
        };
        drop(guard);
        result
    }

    async fn run<H>(
        &self,
        url: &str,
        body: &serde_json::Value,
        handler: &mut H,
        config: &StreamRequestConfig,
        received_content: &mut bool,
    ) -> Result<(), StreamError>
    where
        H: StreamHandler + ?Sized,
    {
        let token = if config.include_auth {
            self.auth_token()
        } else {
            None
        };
        let headers = request_headers(&config.headers, token.as_deref())?;

        handler.on_start().await;

        let resp = self
            .inner
            .client
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status.as_u16(), &body_text));
        }

        let mut byte_stream = resp.bytes_stream();
        let mut lines = LineBuffer::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            for line in lines.push(&chunk) {
                match parse_line(&line) {
                    ParsedLine::Ignored => {}
                    ParsedLine::Malformed { payload, error } => {
                        warn!(
                            error = %error,
                            payload = %truncate(&payload, 200),
                            "skipping unparseable stream line"
                        );
                    }
                    ParsedLine::Event(event) => {
                        if event.kind.is_content() {
                            *received_content = true;
                        }
                        handler.on_event(event).await;
                    }
                }
            }
        }

        if let Some(rest) = lines.take_remainder() {
            debug!(bytes = rest.len(), "discarding unterminated trailing line");
        }

        handler.on_complete().await;
        Ok(())
    }
}

async fn expire(timeout: Duration) {
    if timeout.is_zero() {
        std::future::pending::<()>().await
    } else {
        tokio::time::sleep(timeout).await
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
