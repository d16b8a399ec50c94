//! Conversation-backed streaming chat: one user turn in, one streamed assistant turn out.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{get_streaming_config, ClientConfig, EndpointMode, StreamingMode};
use crate::conversation::{Conversation, ConversationMessage, MessageUpdate, DEFAULT_HISTORY_LIMIT};
use crate::error::StreamError;
use crate::sse::{
    EventKind, SseEvent, SseStreamDriver, StreamHandler, StreamRequestConfig, StreamResult,
};
use crate::util::retry::RetryPolicy;

/// Handler that ignores every event, for callers that only read the conversation.
#[derive(Debug, Default)]
pub struct NoopHandler;

#[async_trait]
impl StreamHandler for NoopHandler {
    async fn on_event(&mut self, _event: SseEvent) {}
}

/// Drives one endpoint and records each exchange in a [`Conversation`].
#[derive(Debug)]
pub struct StreamingChat {
    driver: SseStreamDriver,
    conversation: Conversation,
    url: String,
    request_config: StreamRequestConfig,
    retry: RetryPolicy,
    history_limit: usize,
}

impl StreamingChat {
    /// Chat against `mode`'s endpoint, with limits and retry taken from its profile.
    pub fn new(driver: SseStreamDriver, mode: EndpointMode, config: &ClientConfig) -> Self {
        let streaming_mode = StreamingMode::from(mode);
        Self {
            driver,
            conversation: Conversation::for_mode(streaming_mode),
            url: config.endpoint_url(mode),
            request_config: StreamRequestConfig::for_mode(streaming_mode),
            retry: RetryPolicy::from_config(&get_streaming_config(streaming_mode).retry),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn with_request_config(mut self, config: StreamRequestConfig) -> Self {
        self.request_config = config;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    pub fn driver(&self) -> &SseStreamDriver {
        &self.driver
    }

    /// Abort the in-flight turn, if any.
    pub fn cancel(&self) {
        self.driver.cancel();
    }

    /// Send `prompt` and stream the reply into the conversation.
    ///
    /// The request body is `{"message", "history"}` plus any `extra` fields.
    /// Retryable failures that produced no content are retried per the
    /// retry policy; `handler` sees `on_error` once per failed attempt.
    pub async fn send<H>(
        &mut self,
        prompt: &str,
        extra: serde_json::Map<String, serde_json::Value>,
        handler: &mut H,
    ) -> StreamResult
    where
        H: StreamHandler + ?Sized,
    {
        self.conversation.add_message(ConversationMessage::user(prompt));
        let history = self.conversation.build_history(self.history_limit);
        let mut body = json!({ "message": prompt, "history": history });
        if let Some(object) = body.as_object_mut() {
            object.extend(extra);
        }

        self.conversation.set_error(None);
        self.conversation.set_loading(true);
        self.conversation.set_streaming(true);
        let index = self
            .conversation
            .add_message(ConversationMessage::assistant("").streaming());

        let mut attempt = 1;
        let result = loop {
            let mut sink = ConversationSink {
                conversation: &mut self.conversation,
                index,
                inner: &mut *handler,
            };
            let result = self
                .driver
                .stream(&self.url, &body, &mut sink, Some(self.request_config.clone()))
                .await;

            match &result.error {
                Some(err)
                    if !result.aborted
                        && !result.has_partial_content
                        && self.retry.should_retry(err, attempt) =>
                {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying stream"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                _ => break result,
            }
        };

        self.finish_turn(index, &result);
        result
    }

    fn finish_turn(&mut self, index: usize, result: &StreamResult) {
        self.conversation.set_loading(false);
        self.conversation.set_streaming(false);
        self.conversation
            .update_message(index, MessageUpdate::streaming(false));

        if !result.success && !result.has_partial_content {
            self.conversation.remove_message(index);
        }
        if let Some(err) = result.error.as_ref().filter(|e| !e.is_abort()) {
            self.conversation.set_error(Some(err.to_string()));
        }

        debug!(
            success = result.success,
            aborted = result.aborted,
            messages = self.conversation.len(),
            "chat turn finished"
        );
        if let Err(e) = self.conversation.save_to_storage() {
            warn!(error = %e, "failed to persist conversation");
        }
    }
}

/// Applies streamed events to the assistant placeholder, then forwards them.
struct ConversationSink<'a, H: ?Sized> {
    conversation: &'a mut Conversation,
    index: usize,
    inner: &'a mut H,
}

#[async_trait]
impl<'a, H> StreamHandler for ConversationSink<'a, H>
where
    H: StreamHandler + ?Sized,
{
    async fn on_event(&mut self, event: SseEvent) {
        match event.kind {
            EventKind::Chunk | EventKind::Token => {
                if let Some(text) = event.text() {
                    self.conversation.append_content(self.index, text);
                }
            }
            EventKind::Complete => {
                let empty = self
                    .conversation
                    .get(self.index)
                    .is_some_and(|m| m.content.is_empty());
                if let (true, Some(text)) = (empty, event.text()) {
                    self.conversation
                        .update_message(self.index, MessageUpdate::content(text));
                }
            }
            EventKind::Error => {
                let message = event
                    .message_text()
                    .or_else(|| event.text().map(str::to_string))
                    .unwrap_or_else(|| "stream reported an error".to_string());
                self.conversation.set_error(Some(message));
            }
            _ => {}
        }
        self.inner.on_event(event).await;
    }

    async fn on_start(&mut self) {
        self.inner.on_start().await;
    }

    async fn on_complete(&mut self) {
        self.inner.on_complete().await;
    }

    async fn on_error(&mut self, error: &StreamError) {
        self.inner.on_error(error).await;
    }
}
