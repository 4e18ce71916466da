//! Error taxonomy shared by all vellum crates.
//!
//! Every public API returns [`Result<T>`]. The top-level [`LlmError`]
//! carries a kind, a message, an optional key/value context map, and a
//! machine-readable recoverability marker. Display renders as
//! `"<Kind>: <message> [k1=v1, k2=v2]"` with context keys sorted.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors from context-window management.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The conversation cannot fit the configured token budget.
    #[error("token budget exceeded: need {needed}, budget {budget}")]
    TokenBudgetExceeded {
        /// Tokens required by the conversation.
        needed: usize,
        /// Tokens available.
        budget: usize,
    },
    /// Pruning would leave zero messages.
    #[error("pruning produced an empty conversation")]
    EmptyResult,
    /// History compression failed.
    #[error("compression failed: {0}")]
    CompressionFailed(String),
    /// Messages could not be grouped into semantic blocks.
    #[error("semantic blocking failed: {0}")]
    SemanticBlockingFailed(String),
}

/// Errors from tool resolution and execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// No tool with this name is registered.
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    /// The call's arguments failed schema validation.
    #[error("invalid arguments for tool '{name}': {message}")]
    InvalidArguments {
        /// The tool that rejected the arguments.
        name: String,
        /// What was wrong with them.
        message: String,
    },
    /// The tool handler returned an error or panicked.
    #[error("tool '{name}' failed: {message}")]
    ExecutionFailed {
        /// The tool that failed.
        name: String,
        /// Handler error message.
        message: String,
        /// Underlying cause, when available.
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    /// The tool exceeded its execution timeout.
    #[error("tool call {id} timed out")]
    Timeout {
        /// The tool call id that timed out.
        id: String,
    },
}

/// Errors from the MCP client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum McpError {
    /// Server does not speak any protocol version we support.
    #[error("invalid protocol version: {0}")]
    InvalidProtocolVersion(String),
    /// The server no longer recognizes our session id.
    #[error("session not found: {0}")]
    SessionNotFound(String),
    /// JSON-RPC method not found (-32601).
    #[error("method not found: {0}")]
    MethodNotFound(String),
    /// JSON-RPC invalid params (-32602).
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// The requested MCP tool does not exist (-32001).
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    /// Server-side error (-32000).
    #[error("server error: {0}")]
    ServerError(String),
    /// Transport-level failure (connection, I/O). Recoverable.
    #[error("transport error: {0}")]
    TransportError(String),
}

impl McpError {
    /// Whether retrying the operation might succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TransportError(_))
    }
}

/// Errors from vector and keyword storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Query embedding dimension does not match the stored records.
    #[error("dimension mismatch: query has {query}, store has {store}")]
    DimensionMismatch {
        /// Dimension of the query embedding.
        query: usize,
        /// Dimension of the stored records.
        store: usize,
    },
    /// Record not found.
    #[error("record not found: {0}")]
    NotFound(String),
    /// Transient backend failure (disconnect, lock poisoning). Recoverable.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// Invalid query or record.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    /// Whether retrying the operation might succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Top-level error for all vellum operations.
///
/// Variants map one-to-one onto the error kinds of the taxonomy. Use
/// [`LlmError::is_recoverable`] to decide whether a retry can help;
/// retries are performed only inside provider clients.
#[derive(Debug)]
pub enum LlmError {
    /// Bad or missing credentials.
    Authentication(String),
    /// The provider rate-limited the request.
    RateLimit {
        /// Retry delay suggested by the provider, if any.
        retry_after: Option<Duration>,
    },
    /// HTTP-level provider failure.
    Service {
        /// HTTP status code.
        status: u16,
        /// Provider name (`"openai"`, `"anthropic"`, ...).
        provider: String,
        /// Provider-assigned request id, when present.
        request_id: Option<String>,
        /// Response body or summary.
        message: String,
    },
    /// Network-level failure (timeout, refused connection, DNS).
    Network {
        /// Description of the failure.
        message: String,
        /// Timeouts and disconnects are recoverable; SSRF/blocklist
        /// rejections are not.
        recoverable: bool,
    },
    /// Schema or input validation failure.
    Validation(String),
    /// Missing or invalid configuration.
    Configuration(String),
    /// Context-window management failure.
    Context(ContextError),
    /// Tool resolution or execution failure.
    Tool(ToolError),
    /// MCP protocol or transport failure.
    Mcp(McpError),
    /// Vector/keyword storage failure.
    Storage(StoreError),
    /// The operation was cancelled. Terminal.
    Cancelled,
    /// Anything else, wrapping the underlying cause.
    Unknown {
        /// Description of the failure.
        message: String,
        /// Underlying cause, when available.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl LlmError {
    /// The kind name used in Display and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "Authentication",
            Self::RateLimit { .. } => "RateLimit",
            Self::Service { .. } => "Service",
            Self::Network { .. } => "Network",
            Self::Validation(_) => "Validation",
            Self::Configuration(_) => "Configuration",
            Self::Context(_) => "Context",
            Self::Tool(_) => "ToolExecution",
            Self::Mcp(_) => "MCP",
            Self::Storage(_) => "Storage",
            Self::Cancelled => "Cancelled",
            Self::Unknown { .. } => "Unknown",
        }
    }

    /// The message part of the Display rendering, without kind or context.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Authentication(m) | Self::Validation(m) | Self::Configuration(m) => m.clone(),
            Self::RateLimit { .. } => "rate limited".to_string(),
            Self::Service { message, .. } | Self::Network { message, .. } => message.clone(),
            Self::Context(e) => e.to_string(),
            Self::Tool(e) => e.to_string(),
            Self::Mcp(e) => e.to_string(),
            Self::Storage(e) => e.to_string(),
            Self::Cancelled => "operation cancelled".to_string(),
            Self::Unknown { message, .. } => message.clone(),
        }
    }

    /// Structured key/value detail attached to the error.
    #[must_use]
    pub fn context(&self) -> BTreeMap<String, String> {
        let mut ctx = BTreeMap::new();
        match self {
            Self::RateLimit {
                retry_after: Some(d),
            } => {
                ctx.insert("retryAfterMs".into(), d.as_millis().to_string());
            }
            Self::Service {
                status,
                provider,
                request_id,
                ..
            } => {
                ctx.insert("httpStatus".into(), status.to_string());
                ctx.insert("provider".into(), provider.clone());
                if let Some(id) = request_id {
                    ctx.insert("requestId".into(), id.clone());
                }
            }
            Self::Tool(ToolError::Timeout { id }) => {
                ctx.insert("toolCallId".into(), id.clone());
            }
            _ => {}
        }
        ctx
    }

    /// Whether a retry with backoff can plausibly succeed.
    ///
    /// Retries are performed only at the provider-client layer; the agent
    /// loop never retries tool-handler errors.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::RateLimit { .. } => true,
            Self::Service { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            Self::Network { recoverable, .. } => *recoverable,
            Self::Mcp(e) => e.is_recoverable(),
            Self::Storage(e) => e.is_recoverable(),
            _ => false,
        }
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())?;
        let ctx = self.context();
        if !ctx.is_empty() {
            let rendered: Vec<String> = ctx.iter().map(|(k, v)| format!("{k}={v}")).collect();
            write!(f, " [{}]", rendered.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for LlmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unknown {
                source: Some(s), ..
            } => Some(s.as_ref()),
            Self::Tool(e) => Some(e),
            Self::Context(e) => Some(e),
            Self::Mcp(e) => Some(e),
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ContextError> for LlmError {
    fn from(e: ContextError) -> Self {
        Self::Context(e)
    }
}

impl From<ToolError> for LlmError {
    fn from(e: ToolError) -> Self {
        Self::Tool(e)
    }
}

impl From<McpError> for LlmError {
    fn from(e: McpError) -> Self {
        Self::Mcp(e)
    }
}

impl From<StoreError> for LlmError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e)
    }
}
