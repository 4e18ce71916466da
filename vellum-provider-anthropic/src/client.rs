//! Anthropic client struct and its [`ProviderClient`] implementation.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vellum_types::{
    ChunkAccumulator, ChunkSink, Completion, CompletionOptions, Conversation, LlmError,
    NoopMetrics, ProviderClient, RequestMetrics, RequestOutcome, RequestSample, Result,
    RetryPolicy,
};

use crate::error::{map_http_status, map_reqwest_error, parse_retry_after, request_id};
use crate::mapping::{from_api_response, to_api_request};
use crate::streaming::SseState;

/// Default Anthropic API base URL.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Default model when none is configured.
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Tokens reserved for the completion by default.
const DEFAULT_RESERVE: usize = 4096;

/// Client for the Anthropic Messages API.
///
/// # Example
///
/// ```no_run
/// use vellum_provider_anthropic::Anthropic;
///
/// let client = Anthropic::new("sk-ant-...")
///     .model("claude-opus-4-1");
/// ```
pub struct Anthropic {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
    context_window: Option<usize>,
    reserve_completion: usize,
    metrics: Arc<dyn RequestMetrics>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Anthropic {
    /// Create a client with the given API key and defaults.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
            http: reqwest::Client::new(),
            context_window: None,
            reserve_completion: DEFAULT_RESERVE,
            metrics: Arc::new(NoopMetrics),
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Override the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL (mock servers, proxies).
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Attach a metrics sink.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn RequestMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attach a cancellation token checked at every suspension point.
    #[must_use]
    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the advertised context window.
    #[must_use]
    pub fn context_window_override(mut self, tokens: usize) -> Self {
        self.context_window = Some(tokens);
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    fn request(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.http
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
    }

    fn record(&self, started: Instant, result: &Result<Completion>) {
        let outcome = match result {
            Ok(_) => RequestOutcome::Success,
            Err(e) => RequestOutcome::Error(e.kind().to_string()),
        };
        let usage = result.as_ref().ok().and_then(|c| c.usage);
        self.metrics.record(RequestSample {
            provider: "anthropic".into(),
            model: self.model.clone(),
            latency: started.elapsed(),
            outcome,
            prompt_tokens: usage.map(|u| u.prompt_tokens),
            completion_tokens: usage.map(|u| u.completion_tokens),
            estimated_cost_usd: None,
        });
    }

    async fn complete_once(&self, body: &serde_json::Value) -> Result<Completion> {
        debug!(url = %self.messages_url(), model = %body["model"], "sending completion request");
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(LlmError::Cancelled),
            sent = self.request(body).send() => sent.map_err(map_reqwest_error)?,
        };

        let status = response.status();
        let req_id = request_id(response.headers());
        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.map_err(map_reqwest_error)?;

        if !status.is_success() {
            return Err(map_http_status(status, req_id, retry_after, &text));
        }

        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| LlmError::Unknown {
                message: format!("invalid JSON response: {e}"),
                source: Some(Box::new(e)),
            })?;
        from_api_response(&json, chrono::Utc::now().timestamp())
    }
}

#[async_trait]
impl ProviderClient for Anthropic {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let mut body = to_api_request(conversation, options, &self.model);
        body["stream"] = serde_json::Value::Bool(false);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            let result = self.complete_once(&body).await;
            self.record(started, &result);
            match result {
                Ok(completion) => return Ok(completion),
                Err(err) if self.retry.should_retry(attempt, &err) => {
                    let delay = self.retry.delay_for(attempt, &err);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying request");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(LlmError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn stream_complete(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
        on_chunk: &mut ChunkSink<'_>,
    ) -> Result<Completion> {
        let mut body = to_api_request(conversation, options, &self.model);
        body["stream"] = serde_json::Value::Bool(true);

        let started = Instant::now();
        let result = self.stream_once(&body, on_chunk).await;
        self.record(started, &result);
        result
    }

    fn context_window(&self) -> usize {
        self.context_window.unwrap_or(200_000)
    }

    fn reserve_completion(&self) -> usize {
        self.reserve_completion
    }
}

impl Anthropic {
    async fn stream_once(
        &self,
        body: &serde_json::Value,
        on_chunk: &mut ChunkSink<'_>,
    ) -> Result<Completion> {
        debug!(url = %self.messages_url(), model = %body["model"], "sending streaming request");
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(LlmError::Cancelled),
            sent = self.request(body).send() => sent.map_err(map_reqwest_error)?,
        };

        let status = response.status();
        if !status.is_success() {
            let req_id = request_id(response.headers());
            let retry_after = parse_retry_after(response.headers());
            let text = response.text().await.map_err(map_reqwest_error)?;
            return Err(map_http_status(status, req_id, retry_after, &text));
        }

        let mut byte_stream = response.bytes_stream();
        let mut line_buf = String::new();
        let mut state = SseState::new();
        let mut acc = ChunkAccumulator::new();

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return Err(LlmError::Cancelled),
                next = byte_stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let bytes = chunk.map_err(map_reqwest_error)?;
            let text = std::str::from_utf8(&bytes).map_err(|e| LlmError::Unknown {
                message: format!("invalid UTF-8 in stream: {e}"),
                source: None,
            })?;
            line_buf.push_str(text);

            while let Some(pos) = line_buf.find('\n') {
                let line = line_buf[..pos].trim_end_matches('\r').to_string();
                line_buf.drain(..=pos);
                if self.cancel.is_cancelled() {
                    return Err(LlmError::Cancelled);
                }
                for delta in state.process_line(&line)? {
                    acc.push(&delta);
                    on_chunk(delta);
                }
            }
        }
        if !line_buf.trim().is_empty() {
            let tail = line_buf.trim().to_string();
            for delta in state.process_line(&tail)? {
                acc.push(&delta);
                on_chunk(delta);
            }
        }
        for delta in state.process_line("")? {
            acc.push(&delta);
            on_chunk(delta);
        }

        if let Some(usage) = state.usage.take() {
            acc.set_usage(usage);
        }
        Ok(acc.into_completion(
            state.id.clone(),
            state.model.clone(),
            chrono::Utc::now().timestamp(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_set() {
        let client = Anthropic::new("test-key");
        assert_eq!(client.model, DEFAULT_MODEL);
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.name(), "anthropic");
    }

    #[test]
    fn builder_overrides() {
        let client = Anthropic::new("k")
            .model("claude-opus-4-1")
            .base_url("http://localhost:9999")
            .context_window_override(100_000);
        assert_eq!(client.model, "claude-opus-4-1");
        assert_eq!(client.messages_url(), "http://localhost:9999/v1/messages");
        assert_eq!(client.context_window(), 100_000);
    }

    #[test]
    fn default_context_window_is_200k() {
        assert_eq!(Anthropic::new("k").context_window(), 200_000);
    }
}
