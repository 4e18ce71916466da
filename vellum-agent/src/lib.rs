#![deny(missing_docs)]
//! The agent loop: drive complete → tool → complete cycles against any
//! [`vellum_types::ProviderClient`], with guardrails on input and
//! output, an observable event stream, and serializable run state.

pub mod agent;
pub mod events;
pub mod guardrail;
pub mod state;

pub use agent::{Agent, AgentConfig, ContextAugmenter, ToolTimeoutBehavior};
pub use events::AgentEvent;
pub use guardrail::{
    Guardrail, GuardrailVerdict, all, any, injection_guardrail, length_guardrail, pii_guardrail,
    sequential,
};
pub use state::{AgentState, AgentStatus};
