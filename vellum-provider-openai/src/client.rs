//! OpenAI and Azure OpenAI client structs and their [`ProviderClient`]
//! implementations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vellum_types::{
    ChunkAccumulator, ChunkSink, Completion, CompletionOptions, Conversation, LlmError,
    NoopMetrics, ProviderClient, RequestMetrics, RequestOutcome, RequestSample, Result,
    RetryPolicy,
};

use crate::error::{map_http_status, map_reqwest_error, parse_retry_after, request_id};
use crate::mapping::{from_api_response, to_api_request};
use crate::streaming::{LineBuffer, StreamMeta, parse_sse_line};

/// Default OpenAI API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenRouter's base URL (same dialect, arbitrary model strings).
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";

/// Default model when none is configured.
const DEFAULT_MODEL: &str = "gpt-4o";

/// Tokens reserved for the completion by default.
const DEFAULT_RESERVE: usize = 4096;

/// Context window for a model this crate knows about.
fn default_context_window(model: &str) -> usize {
    if model.starts_with("o1") || model.starts_with("o3") || model.starts_with("gpt-4.1") {
        200_000
    } else if model.starts_with("gpt-3.5") {
        16_385
    } else {
        128_000
    }
}

/// The pieces shared by every chat-completions endpoint: an HTTP client,
/// a URL, and the headers that authenticate against it.
struct ChatEndpoint {
    http: reqwest::Client,
    url: String,
    provider: String,
    headers: Vec<(&'static str, String)>,
}

impl ChatEndpoint {
    fn request(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let mut req = self.http.post(&self.url);
        for (name, value) in &self.headers {
            req = req.header(*name, value);
        }
        req.json(body)
    }

    /// One non-streaming request, no retries.
    async fn complete_once(
        &self,
        body: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        debug!(url = %self.url, model = %body["model"], "sending completion request");
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            sent = self.request(body).send() => sent.map_err(map_reqwest_error)?,
        };

        let status = response.status();
        let req_id = request_id(response.headers());
        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.map_err(map_reqwest_error)?;

        if !status.is_success() {
            return Err(map_http_status(status, &self.provider, req_id, retry_after, &text));
        }

        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| LlmError::Unknown {
                message: format!("invalid JSON response: {e}"),
                source: Some(Box::new(e)),
            })?;
        from_api_response(&json)
    }

    /// One streaming request. Not retried once the body has started.
    async fn stream_once(
        &self,
        body: &serde_json::Value,
        cancel: &CancellationToken,
        on_chunk: &mut ChunkSink<'_>,
    ) -> Result<Completion> {
        use futures::StreamExt;

        debug!(url = %self.url, model = %body["model"], "sending streaming request");
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            sent = self.request(body).send() => sent.map_err(map_reqwest_error)?,
        };

        let status = response.status();
        if !status.is_success() {
            let req_id = request_id(response.headers());
            let retry_after = parse_retry_after(response.headers());
            let text = response.text().await.map_err(map_reqwest_error)?;
            return Err(map_http_status(status, &self.provider, req_id, retry_after, &text));
        }

        let mut byte_stream = response.bytes_stream();
        let mut lines = LineBuffer::new();
        let mut meta = StreamMeta::default();
        let mut acc = ChunkAccumulator::new();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                next = byte_stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let bytes = chunk.map_err(map_reqwest_error)?;
            for line in lines.push(&bytes)? {
                if cancel.is_cancelled() {
                    return Err(LlmError::Cancelled);
                }
                for delta in parse_sse_line(&line, &mut meta)? {
                    acc.push(&delta);
                    on_chunk(delta);
                }
            }
        }
        if let Some(rest) = lines.remainder() {
            for delta in parse_sse_line(&rest, &mut meta)? {
                acc.push(&delta);
                on_chunk(delta);
            }
        }

        if let Some(usage) = meta.usage.take() {
            acc.set_usage(usage);
        }
        Ok(acc.into_completion(meta.id, meta.model, meta.created))
    }
}

/// Shared client state for the OpenAI dialect.
struct Inner {
    endpoint: ChatEndpoint,
    model: String,
    context_window: Option<usize>,
    reserve_completion: usize,
    metrics: Arc<dyn RequestMetrics>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Inner {
    fn record(&self, started: Instant, result: &Result<Completion>) {
        let outcome = match result {
            Ok(_) => RequestOutcome::Success,
            Err(e) => RequestOutcome::Error(e.kind().to_string()),
        };
        let usage = result.as_ref().ok().and_then(|c| c.usage);
        self.metrics.record(RequestSample {
            provider: self.endpoint.provider.clone(),
            model: self.model.clone(),
            latency: started.elapsed(),
            outcome,
            prompt_tokens: usage.map(|u| u.prompt_tokens),
            completion_tokens: usage.map(|u| u.completion_tokens),
            estimated_cost_usd: None,
        });
    }

    async fn complete(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let body = to_api_request(conversation, options, &self.model);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            let result = self.endpoint.complete_once(&body, &self.cancel).await;
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
        body["stream_options"] = serde_json::json!({ "include_usage": true });
        let started = Instant::now();
        let result = self.endpoint.stream_once(&body, &self.cancel, on_chunk).await;
        self.record(started, &result);
        result
    }
}

/// Client for the OpenAI Chat Completions API and compatible servers.
///
/// # Example
///
/// ```no_run
/// use vellum_provider_openai::OpenAi;
///
/// let client = OpenAi::new("sk-...")
///     .model("gpt-4o-mini")
///     .base_url("https://api.openai.com");
/// ```
pub struct OpenAi {
    inner: Inner,
    api_key: String,
    base_url: String,
}

impl OpenAi {
    /// Create a client for api.openai.com with default settings.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client for OpenRouter.
    ///
    /// OpenRouter speaks the same dialect and accepts arbitrary model
    /// strings, slash-prefixed included.
    #[must_use]
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, OPENROUTER_BASE_URL)
    }

    fn with_base_url(api_key: impl Into<String>, base_url: &str) -> Self {
        let api_key = api_key.into();
        let base_url = base_url.to_string();
        Self {
            inner: Inner {
                endpoint: ChatEndpoint {
                    http: reqwest::Client::new(),
                    url: chat_url(&base_url),
                    provider: provider_for(&base_url).to_string(),
                    headers: vec![("authorization", format!("Bearer {api_key}"))],
                },
                model: DEFAULT_MODEL.to_string(),
                context_window: None,
                reserve_completion: DEFAULT_RESERVE,
                metrics: Arc::new(NoopMetrics),
                retry: RetryPolicy::default(),
                cancel: CancellationToken::new(),
            },
            api_key,
            base_url,
        }
    }

    /// Override the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.inner.model = model.into();
        self
    }

    /// Override the base URL (mock servers, proxies, OpenRouter).
    ///
    /// A base URL containing `openrouter.ai` switches the provider name
    /// to `openrouter` regardless of how the client was constructed.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self.inner.endpoint.url = chat_url(&self.base_url);
        self.inner.endpoint.provider = provider_for(&self.base_url).to_string();
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.inner.endpoint.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    /// Attach a metrics sink.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn RequestMetrics>) -> Self {
        self.inner.metrics = metrics;
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.inner.retry = retry;
        self
    }

    /// Attach a cancellation token checked at every suspension point.
    #[must_use]
    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.inner.cancel = cancel;
        self
    }

    /// Override the advertised context window.
    #[must_use]
    pub fn context_window_override(mut self, tokens: usize) -> Self {
        self.inner.context_window = Some(tokens);
        self
    }

    /// The configured API key (used by the router for diagnostics).
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

fn chat_url(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

fn provider_for(base_url: &str) -> &'static str {
    if base_url.contains("openrouter.ai") {
        "openrouter"
    } else {
        "openai"
    }
}

#[async_trait]
impl ProviderClient for OpenAi {
    fn name(&self) -> &str {
        &self.inner.endpoint.provider
    }

    async fn complete(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
    ) -> Result<Completion> {
        self.inner.complete(conversation, options).await
    }

    async fn stream_complete(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
        on_chunk: &mut ChunkSink<'_>,
    ) -> Result<Completion> {
        self.inner.stream_complete(conversation, options, on_chunk).await
    }

    fn context_window(&self) -> usize {
        self.inner
            .context_window
            .unwrap_or_else(|| default_context_window(&self.inner.model))
    }

    fn reserve_completion(&self) -> usize {
        self.inner.reserve_completion
    }
}

/// Client for Azure OpenAI deployments.
///
/// Azure routes by deployment name in the URL and authenticates with an
/// `api-key` header; the body is the standard chat-completions shape.
pub struct AzureOpenAi {
    inner: Inner,
}

impl AzureOpenAi {
    /// Create a client for one Azure deployment.
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        let deployment = deployment.into();
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.into().trim_end_matches('/'),
            deployment,
            api_version.into(),
        );
        Self {
            inner: Inner {
                endpoint: ChatEndpoint {
                    http: reqwest::Client::new(),
                    url,
                    provider: "azure".to_string(),
                    headers: vec![("api-key", api_key.into())],
                },
                model: deployment,
                context_window: None,
                reserve_completion: DEFAULT_RESERVE,
                metrics: Arc::new(NoopMetrics),
                retry: RetryPolicy::default(),
                cancel: CancellationToken::new(),
            },
        }
    }

    /// Attach a metrics sink.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn RequestMetrics>) -> Self {
        self.inner.metrics = metrics;
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.inner.retry = retry;
        self
    }

    /// Attach a cancellation token checked at every suspension point.
    #[must_use]
    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.inner.cancel = cancel;
        self
    }

    /// Override the advertised context window.
    #[must_use]
    pub fn context_window_override(mut self, tokens: usize) -> Self {
        self.inner.context_window = Some(tokens);
        self
    }
}

#[async_trait]
impl ProviderClient for AzureOpenAi {
    fn name(&self) -> &str {
        "azure"
    }

    async fn complete(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
    ) -> Result<Completion> {
        self.inner.complete(conversation, options).await
    }

    async fn stream_complete(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
        on_chunk: &mut ChunkSink<'_>,
    ) -> Result<Completion> {
        self.inner.stream_complete(conversation, options, on_chunk).await
    }

    fn context_window(&self) -> usize {
        self.inner
            .context_window
            .unwrap_or_else(|| default_context_window(&self.inner.model))
    }

    fn reserve_completion(&self) -> usize {
        self.inner.reserve_completion
    }
}
