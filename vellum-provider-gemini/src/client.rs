//! Gemini client struct and its [`ProviderClient`] implementation.

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

use crate::mapping::{from_api_response, to_api_request};
use crate::streaming::SseState;

/// Default Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model when none is configured.
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Tokens reserved for the completion by default.
const DEFAULT_RESERVE: usize = 4096;

/// Client for the Gemini generateContent API.
///
/// # Example
///
/// ```no_run
/// use vellum_provider_gemini::Gemini;
///
/// let client = Gemini::new("AIza...").model("gemini-2.0-flash");
/// ```
pub struct Gemini {
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

impl Gemini {
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

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model,
        )
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model,
        )
    }

    fn record(&self, started: Instant, result: &Result<Completion>) {
        let outcome = match result {
            Ok(_) => RequestOutcome::Success,
            Err(e) => RequestOutcome::Error(e.kind().to_string()),
        };
        let usage = result.as_ref().ok().and_then(|c| c.usage);
        self.metrics.record(RequestSample {
            provider: "gemini".into(),
            model: self.model.clone(),
            latency: started.elapsed(),
            outcome,
            prompt_tokens: usage.map(|u| u.prompt_tokens),
            completion_tokens: usage.map(|u| u.completion_tokens),
            estimated_cost_usd: None,
        });
    }

    fn map_status(&self, status: reqwest::StatusCode, body: &str) -> LlmError {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| body.chars().take(200).collect());
        match status.as_u16() {
            401 | 403 => LlmError::Authentication(message),
            429 => LlmError::RateLimit { retry_after: None },
            code => LlmError::Service {
                status: code,
                provider: "gemini".into(),
                request_id: None,
                message,
            },
        }
    }

    fn map_transport(err: reqwest::Error) -> LlmError {
        LlmError::Network {
            message: err.to_string(),
            recoverable: true,
        }
    }

    async fn complete_once(&self, body: &serde_json::Value) -> Result<Completion> {
        let url = self.generate_url();
        debug!(url = %url, "sending completion request");
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(LlmError::Cancelled),
            sent = self
                .http
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send() => sent.map_err(Self::map_transport)?,
        };

        let status = response.status();
        let text = response.text().await.map_err(Self::map_transport)?;
        if !status.is_success() {
            return Err(self.map_status(status, &text));
        }

        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| LlmError::Unknown {
                message: format!("invalid JSON response: {e}"),
                source: Some(Box::new(e)),
            })?;
        from_api_response(
            &json,
            format!("gemini-{}", uuid::Uuid::new_v4()),
            chrono::Utc::now().timestamp(),
            &self.model,
        )
    }
}

#[async_trait]
impl ProviderClient for Gemini {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let body = to_api_request(conversation, options);

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
        let body = to_api_request(conversation, options);
        let started = Instant::now();
        let result = self.stream_once(&body, on_chunk).await;
        self.record(started, &result);
        result
    }

    fn context_window(&self) -> usize {
        self.context_window.unwrap_or(1_048_576)
    }

    fn reserve_completion(&self) -> usize {
        self.reserve_completion
    }
}

impl Gemini {
    async fn stream_once(
        &self,
        body: &serde_json::Value,
        on_chunk: &mut ChunkSink<'_>,
    ) -> Result<Completion> {
        let url = self.stream_url();
        debug!(url = %url, "sending streaming request");
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(LlmError::Cancelled),
            sent = self
                .http
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send() => sent.map_err(Self::map_transport)?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.map_err(Self::map_transport)?;
            return Err(self.map_status(status, &text));
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
            let bytes = chunk.map_err(Self::map_transport)?;
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

        if let Some(usage) = state.usage.take() {
            acc.set_usage(usage);
        }
        Ok(acc.into_completion(
            format!("gemini-{}", uuid::Uuid::new_v4()),
            if state.model.is_empty() {
                self.model.clone()
            } else {
                state.model.clone()
            },
            chrono::Utc::now().timestamp(),
        ))
    }
}
