//! The agent loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vellum_tool::{ExecutionStrategy, ToolRegistry, execute_calls};
use vellum_types::{
    CompletionOptions, LlmError, Message, ProviderClient, Result, StreamedChunk, ToolError,
};

use crate::events::{AgentEvent, EventSink};
use crate::guardrail::{Guardrail, run_chain};
use crate::state::{AgentState, AgentStatus};

/// What to do when a tool call exceeds its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolTimeoutBehavior {
    /// End the run as failed (the default).
    #[default]
    AbortRun,
    /// Feed a synthetic error tool message back to the model and keep
    /// going.
    SyntheticError,
}

/// Injects retrieved context into the run before the first LLM call.
///
/// The RAG layer implements this to put relevant documents into the
/// system prompt.
#[async_trait]
pub trait ContextAugmenter: Send + Sync {
    /// Produce extra system-prompt text for the query, or `None`.
    async fn augment(&self, query: &str) -> Result<Option<String>>;
}

/// Configuration for an [`Agent`].
pub struct AgentConfig {
    /// System prompt prepended to every run.
    pub system_prompt: Option<String>,
    /// Maximum complete → tools cycles before the run fails.
    pub max_steps: usize,
    /// How tool-call batches are scheduled.
    pub strategy: ExecutionStrategy,
    /// Per-tool-call timeout.
    pub tool_timeout: Option<Duration>,
    /// Behavior when a tool call times out.
    pub on_tool_timeout: ToolTimeoutBehavior,
    /// Guardrails over user input, run before the first LLM call.
    pub input_guardrails: Vec<Arc<dyn Guardrail>>,
    /// Guardrails over every assistant textual response.
    pub output_guardrails: Vec<Arc<dyn Guardrail>>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_steps: 10,
            strategy: ExecutionStrategy::Sequential,
            tool_timeout: None,
            on_tool_timeout: ToolTimeoutBehavior::AbortRun,
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
        }
    }
}

/// Drives complete → tool → complete cycles until the model answers
/// without tool calls, a guardrail blocks, the step limit is hit, the
/// provider fails, or the run is cancelled.
///
/// Terminal outcomes land in [`AgentState::status`]; `Err` is reserved
/// for caller mistakes such as resuming against a registry that lacks
/// the recorded tools.
pub struct Agent {
    provider: Arc<dyn ProviderClient>,
    options: CompletionOptions,
    config: AgentConfig,
    augmenter: Option<Arc<dyn ContextAugmenter>>,
    cancel: CancellationToken,
}

impl Agent {
    /// Create an agent over a provider with default configuration.
    #[must_use]
    pub fn new(provider: Arc<dyn ProviderClient>) -> Self {
        Self {
            provider,
            options: CompletionOptions::default(),
            config: AgentConfig::default(),
            augmenter: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Base sampling options (tools are filled in per run).
    #[must_use]
    pub fn options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach a retrieval augmenter.
    #[must_use]
    pub fn augmenter(mut self, augmenter: Arc<dyn ContextAugmenter>) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    /// Attach a cancellation token observed at every suspension point.
    #[must_use]
    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run a query to completion.
    ///
    /// # Errors
    ///
    /// Only on caller mistakes; run failures land in the returned
    /// state's status.
    pub async fn run(&self, query: &str, registry: &ToolRegistry) -> Result<AgentState> {
        self.run_inner(query, registry, EventSink::new(None)).await
    }

    /// Run a query, emitting [`AgentEvent`]s on the channel.
    ///
    /// A dropped receiver never fails the run. Streamed content deltas
    /// arrive as [`AgentEvent::LlmChunk`].
    ///
    /// # Errors
    ///
    /// Same contract as [`Agent::run`].
    pub async fn run_with_events(
        &self,
        query: &str,
        registry: &ToolRegistry,
        events: mpsc::Sender<AgentEvent>,
    ) -> Result<AgentState> {
        self.run_inner(query, registry, EventSink::new(Some(events))).await
    }

    /// Resume a persisted run with another user message.
    ///
    /// # Errors
    ///
    /// [`LlmError::Validation`] when the registry is missing a tool the
    /// state was recorded with.
    pub async fn continue_conversation(
        &self,
        mut state: AgentState,
        input: &str,
        registry: &ToolRegistry,
    ) -> Result<AgentState> {
        for name in &state.tool_names {
            if registry.get(name).is_none() {
                return Err(LlmError::Validation(format!(
                    "registry is missing tool '{name}' recorded in the state"
                )));
            }
        }

        let sink = EventSink::new(None);
        match run_chain(&self.config.input_guardrails, input) {
            Ok(text) => state.conversation.push(Message::user(text)),
            Err(reason) => return Ok(self.finish_failed(state, reason, &sink).await),
        }
        self.drive(state, registry, sink).await
    }

    async fn run_inner(
        &self,
        query: &str,
        registry: &ToolRegistry,
        sink: EventSink,
    ) -> Result<AgentState> {
        let mut state = AgentState::new();
        state.tool_names = registry.names();

        if let Some(system) = &self.config.system_prompt {
            state.conversation.push(Message::system(system.clone()));
        }
        if let Some(augmenter) = &self.augmenter
            && let Some(context) = augmenter.augment(query).await?
        {
            debug!("injecting retrieved context into system prompt");
            state.conversation.push(Message::system(context));
        }

        match run_chain(&self.config.input_guardrails, query) {
            Ok(text) => state.conversation.push(Message::user(text)),
            Err(reason) => return Ok(self.finish_failed(state, reason, &sink).await),
        }

        self.drive(state, registry, sink).await
    }

    async fn drive(
        &self,
        mut state: AgentState,
        registry: &ToolRegistry,
        sink: EventSink,
    ) -> Result<AgentState> {
        let options = self.options.clone().with_tools(registry.definitions());

        loop {
            if self.cancel.is_cancelled() {
                let reason = LlmError::Cancelled.to_string();
                return Ok(self.finish_failed(state, reason, &sink).await);
            }
            if state.steps >= self.config.max_steps {
                let reason = format!("maximum steps reached ({})", self.config.max_steps);
                return Ok(self.finish_failed(state, reason, &sink).await);
            }

            state.status = AgentStatus::AwaitingLlm;
            sink.emit(AgentEvent::LlmRequestStart { step: state.steps }).await;

            let completion = if sink.wants_chunks() {
                let chunk_sink = sink.clone();
                let mut forward = move |chunk: StreamedChunk| {
                    if let Some(delta) = chunk.content {
                        chunk_sink.emit_now(AgentEvent::LlmChunk { delta });
                    }
                };
                self.provider
                    .stream_complete(&state.conversation, &options, &mut forward)
                    .await
            } else {
                self.provider.complete(&state.conversation, &options).await
            };

            let completion = match completion {
                Ok(completion) => completion,
                Err(err) => {
                    return Ok(self.finish_failed(state, err.to_string(), &sink).await);
                }
            };
            sink.emit(AgentEvent::LlmRequestEnd {
                usage: completion.usage,
            })
            .await;

            // Output guardrails run on every assistant textual response.
            let content = if completion.content.is_empty() {
                String::new()
            } else {
                match run_chain(&self.config.output_guardrails, &completion.content) {
                    Ok(text) => text,
                    Err(reason) => {
                        return Ok(self.finish_failed(state, reason, &sink).await);
                    }
                }
            };

            if completion.tool_calls.is_empty() {
                state.conversation.push(Message::assistant(content));
                sink.emit(AgentEvent::StepComplete { step: state.steps }).await;
                state.steps += 1;
                state.status = AgentStatus::Done;
                info!(steps = state.steps, "run complete");
                sink.emit(AgentEvent::RunComplete {
                    status: state.status.clone(),
                })
                .await;
                return Ok(state);
            }

            state
                .conversation
                .push(Message::assistant_with_tools(content, completion.tool_calls.clone()));
            state.status = AgentStatus::ExecutingTools;

            for call in &completion.tool_calls {
                sink.emit(AgentEvent::ToolCallStart {
                    id: call.id.clone(),
                    name: call.name.clone(),
                })
                .await;
            }

            let outcomes = execute_calls(
                registry,
                &completion.tool_calls,
                self.config.strategy,
                self.config.tool_timeout,
            )
            .await;

            let mut timeout_abort: Option<String> = None;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(value) => {
                        sink.emit(AgentEvent::ToolCallEnd {
                            id: outcome.id.clone(),
                            output: Some(value.clone()),
                            error: None,
                        })
                        .await;
                    }
                    Err(err) => {
                        sink.emit(AgentEvent::ToolCallEnd {
                            id: outcome.id.clone(),
                            output: None,
                            error: Some(err.to_string()),
                        })
                        .await;
                        if matches!(err, ToolError::Timeout { .. })
                            && self.config.on_tool_timeout == ToolTimeoutBehavior::AbortRun
                        {
                            timeout_abort = Some(err.to_string());
                        }
                    }
                }
            }

            // Tool messages append in the assistant's call order no
            // matter how execution interleaved.
            for outcome in outcomes {
                let content = match outcome.result {
                    Ok(value) => value.to_string(),
                    Err(err) => format!("Error: {err}"),
                };
                state.conversation.push(Message::tool(content, outcome.id));
            }

            if let Some(reason) = timeout_abort {
                return Ok(self.finish_failed(state, reason, &sink).await);
            }

            sink.emit(AgentEvent::StepComplete { step: state.steps }).await;
            state.steps += 1;
        }
    }

    async fn finish_failed(
        &self,
        mut state: AgentState,
        reason: String,
        sink: &EventSink,
    ) -> AgentState {
        info!(reason = %reason, "run failed");
        state.status = AgentStatus::Failed { reason };
        sink.emit(AgentEvent::RunComplete {
            status: state.status.clone(),
        })
        .await;
        state
    }
}
