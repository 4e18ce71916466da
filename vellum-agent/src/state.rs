//! Serializable agent run state.

use serde::{Deserialize, Serialize};
use vellum_types::Conversation;

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    /// No query submitted yet.
    Idle,
    /// Waiting on a provider completion.
    AwaitingLlm,
    /// Executing tool calls from the last completion.
    ExecutingTools,
    /// The run finished with a final assistant response.
    Done,
    /// The run ended early.
    Failed {
        /// Why the run failed (guardrail, max steps, provider error,
        /// cancellation).
        reason: String,
    },
}

impl AgentStatus {
    /// Whether the run reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }
}

/// The whole state of an agent run.
///
/// Serializable for persistence. Tool handlers are not serialized -
/// only their names - so resuming requires a registry providing the
/// same names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// The conversation so far.
    pub conversation: Conversation,
    /// Names of the tools the run was started with.
    pub tool_names: Vec<String>,
    /// Completed steps (one step = one completion plus its tools).
    pub steps: usize,
    /// Current status.
    pub status: AgentStatus,
}

impl AgentState {
    /// A fresh idle state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            conversation: Conversation::new(),
            tool_names: Vec::new(),
            steps: 0,
            status: AgentStatus::Idle,
        }
    }

    /// The final assistant response, when the run is done.
    #[must_use]
    pub fn final_response(&self) -> Option<&str> {
        self.conversation.last_assistant_text()
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}
