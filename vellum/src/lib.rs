#![deny(missing_docs)]
//! vellum - an LLM integration toolkit.
//!
//! One facade over the workspace: conversation and completion types,
//! provider clients for the OpenAI family (OpenAI, Azure, OpenRouter),
//! Anthropic, Ollama, and Gemini, the agent loop with guardrails and
//! events, a typed tool registry with an MCP bridge, context-window
//! management, permissioned hybrid retrieval, and a DAG runner for
//! multi-agent plans.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use vellum::{Agent, EnvConfigReader, ToolRegistry, client_for_model};
//!
//! # async fn demo() -> vellum::Result<()> {
//! let provider = client_for_model("openai/gpt-4o-mini", &EnvConfigReader)?;
//! let agent = Agent::new(Arc::from(provider));
//! let state = agent.run("What is 2+2?", &ToolRegistry::new()).await?;
//! println!("{}", state.final_response().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod router;

pub use config::{ConfigReader, EnvConfigReader, StaticConfigReader};
pub use router::{client_for_model, client_from_env};

pub use vellum_agent::{
    Agent, AgentConfig, AgentEvent, AgentState, AgentStatus, ContextAugmenter, Guardrail,
    GuardrailVerdict, ToolTimeoutBehavior, all, any, injection_guardrail, length_guardrail,
    pii_guardrail, sequential,
};
pub use vellum_context::{
    BlockType, ContextPipeline, ConversationTokenCounter, HeuristicTokenizer, HistoryCompressor,
    PruneStrategy, SemanticBlock, Tokenizer, enforce_budget, group_into_semantic_blocks,
};
pub use vellum_mcp::{McpClient, McpToolDescriptor, McpToolOutput, McpToolSource, ProtocolVersion};
pub use vellum_orch::{Edge, NodeId, OrchAgent, Plan, PlanFailure};
pub use vellum_provider_anthropic::Anthropic;
pub use vellum_provider_gemini::Gemini;
pub use vellum_provider_ollama::Ollama;
pub use vellum_provider_openai::{AzureOpenAi, OpenAi};
pub use vellum_rag::{
    Collection, CollectionPath, CollectionPattern, DocumentChunk, DocumentVersion, PrincipalId,
    RagEngine, SyncReport, SyncableSource, UserAuthorization,
};
pub use vellum_store::{
    Filter, FusionStrategy, HybridMatch, HybridSearcher, InMemoryKeywordIndex,
    InMemoryVectorStore, KeywordHit, KeywordIndex, ScoredRecord, StoreStats, VectorRecord,
    VectorStore,
};
pub use vellum_tool::{
    ExecutionStrategy, ParameterSchema, Tool, ToolCallRequest, ToolHandler, ToolRegistry,
    execute_calls,
};
pub use vellum_types::{
    ChunkAccumulator, ChunkSink, Completion, CompletionOptions, ContextError, Conversation,
    LlmError, McpError, Message, NoopMetrics, PartialToolCall, ProviderClient, ReasoningEffort,
    RequestMetrics, RequestOutcome, RequestSample, Result, RetryPolicy, StoreError, StreamedChunk,
    TokenUsage, ToolCall, ToolChoice, ToolDefinition, ToolError,
};
