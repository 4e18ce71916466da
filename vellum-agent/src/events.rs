//! Events emitted while a run progresses.
//!
//! Events arrive in causal order: a `ToolCallStart` always precedes its
//! `ToolCallEnd`, and every `ToolCallEnd` precedes the next
//! `LlmRequestStart`. A dropped receiver never fails the run.

use tokio::sync::mpsc;
use vellum_types::TokenUsage;

use crate::state::AgentStatus;

/// One observable moment in an agent run.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A provider request is about to go out.
    LlmRequestStart {
        /// Zero-based step index.
        step: usize,
    },
    /// A streamed content delta arrived.
    LlmChunk {
        /// The text delta.
        delta: String,
    },
    /// The provider request finished.
    LlmRequestEnd {
        /// Usage reported by the provider, when known.
        usage: Option<TokenUsage>,
    },
    /// A tool call is starting.
    ToolCallStart {
        /// The call id.
        id: String,
        /// The tool name.
        name: String,
    },
    /// A tool call finished.
    ToolCallEnd {
        /// The call id.
        id: String,
        /// Tool output on success.
        output: Option<serde_json::Value>,
        /// Error message on failure.
        error: Option<String>,
    },
    /// One complete → tools cycle finished.
    StepComplete {
        /// Zero-based step index.
        step: usize,
    },
    /// The run reached a terminal state.
    RunComplete {
        /// The final status.
        status: AgentStatus,
    },
}

/// Best-effort event sender: a full or closed channel drops events
/// rather than stalling or failing the run.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: Option<mpsc::Sender<AgentEvent>>,
}

impl EventSink {
    pub(crate) fn new(tx: Option<mpsc::Sender<AgentEvent>>) -> Self {
        Self { tx }
    }

    pub(crate) fn wants_chunks(&self) -> bool {
        self.tx.is_some()
    }

    pub(crate) async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }

    /// Synchronous emit for use inside stream callbacks.
    pub(crate) fn emit_now(&self, event: AgentEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}
