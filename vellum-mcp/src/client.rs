//! The MCP client: connection fallback, sessions, tool listing and
//! invocation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vellum_types::McpError;

use crate::jsonrpc::JsonRpcRequest;
use crate::transport::{HttpTransport, McpTransport, StdioTransport, StreamableHttpTransport};
use crate::types::{McpToolDescriptor, McpToolOutput, ProtocolVersion};

/// How long a `tools/list` result is served from cache.
pub const TOOL_CACHE_TTL: Duration = Duration::from_secs(300);

/// Connection fallback ladder, newest dialect first.
///
/// An explicit state machine rather than a cascade of error handlers:
/// every state names the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectState {
    /// Streamable HTTP, 2025-06-18.
    AttemptStreamableHttp,
    /// Streamable HTTP, 2025-03-26.
    AttemptStreamableHttpLegacy,
    /// Plain JSON-RPC POSTs, 2024-11-05.
    AttemptPlainJsonRpc,
    /// Nothing left to try.
    FailInit,
}

impl ConnectState {
    fn version(self) -> Option<ProtocolVersion> {
        match self {
            Self::AttemptStreamableHttp => Some(ProtocolVersion::V2025_06_18),
            Self::AttemptStreamableHttpLegacy => Some(ProtocolVersion::V2025_03_26),
            Self::AttemptPlainJsonRpc => Some(ProtocolVersion::V2024_11_05),
            Self::FailInit => None,
        }
    }

    fn next(self) -> Self {
        match self {
            Self::AttemptStreamableHttp => Self::AttemptStreamableHttpLegacy,
            Self::AttemptStreamableHttpLegacy => Self::AttemptPlainJsonRpc,
            Self::AttemptPlainJsonRpc | Self::FailInit => Self::FailInit,
        }
    }
}

/// A connected MCP client.
///
/// Obtained from [`McpClient::connect`] (HTTP, with transport/version
/// fallback) or [`McpClient::connect_stdio`] (spawned server process).
pub struct McpClient {
    transport: Box<dyn McpTransport>,
    version: ProtocolVersion,
    next_id: AtomicU64,
    tool_cache: Mutex<Option<(Instant, Vec<McpToolDescriptor>)>>,
    cache_ttl: Duration,
    client_name: String,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("version", &self.version)
            .field("client_name", &self.client_name)
            .finish()
    }
}

impl McpClient {
    /// Connect to an HTTP MCP server.
    ///
    /// Walks the fallback ladder: streamable HTTP at 2025-06-18, then
    /// 2025-03-26, then plain JSON-RPC at 2024-11-05. The server's
    /// `initialize` response selects the effective version (newest both
    /// sides support).
    ///
    /// # Errors
    ///
    /// The last attempt's error when every rung fails.
    pub async fn connect(url: impl Into<String>) -> Result<Self, McpError> {
        let url = url.into();
        let mut state = ConnectState::AttemptStreamableHttp;
        let mut last_error =
            McpError::TransportError("no connection attempt was made".into());

        while let Some(attempted) = state.version() {
            let transport: Box<dyn McpTransport> = match state {
                ConnectState::AttemptPlainJsonRpc => Box::new(HttpTransport::new(&url)),
                _ => Box::new(StreamableHttpTransport::new(&url, attempted)),
            };

            match Self::initialize(transport.as_ref(), attempted).await {
                Ok(effective) => {
                    info!(version = effective.as_str(), "MCP connection established");
                    transport.set_protocol_version(effective);
                    let client = Self {
                        transport,
                        version: effective,
                        next_id: AtomicU64::new(2),
                        tool_cache: Mutex::new(None),
                        cache_ttl: TOOL_CACHE_TTL,
                        client_name: "vellum".into(),
                    };
                    client
                        .transport
                        .notify("notifications/initialized", serde_json::Value::Null)
                        .await
                        .ok();
                    return Ok(client);
                }
                Err(err) => {
                    warn!(state = ?state, error = %err, "MCP connection attempt failed");
                    last_error = err;
                    state = state.next();
                }
            }
        }

        Err(last_error)
    }

    /// Connect by spawning a server process speaking stdio.
    ///
    /// # Errors
    ///
    /// [`McpError::TransportError`] on spawn failure; handshake errors
    /// surface with the codes mapped in [`crate::jsonrpc`].
    pub async fn connect_stdio(command: tokio::process::Command) -> Result<Self, McpError> {
        let transport = Box::new(StdioTransport::spawn(command)?);
        let effective =
            Self::initialize(transport.as_ref(), ProtocolVersion::V2025_06_18).await?;
        let client = Self {
            transport,
            version: effective,
            next_id: AtomicU64::new(2),
            tool_cache: Mutex::new(None),
            cache_ttl: TOOL_CACHE_TTL,
            client_name: "vellum".into(),
        };
        client
            .transport
            .notify("notifications/initialized", serde_json::Value::Null)
            .await
            .ok();
        Ok(client)
    }

    /// Run the `initialize` handshake; returns the effective version.
    async fn initialize(
        transport: &dyn McpTransport,
        attempted: ProtocolVersion,
    ) -> Result<ProtocolVersion, McpError> {
        let request = JsonRpcRequest::new(
            1,
            "initialize",
            serde_json::json!({
                "protocolVersion": attempted.as_str(),
                "capabilities": { "tools": {} },
                "clientInfo": { "name": "vellum", "version": env!("CARGO_PKG_VERSION") },
            }),
        );
        let result = transport.request(request).await?.into_result()?;

        let server_version = result["protocolVersion"]
            .as_str()
            .ok_or_else(|| {
                McpError::InvalidProtocolVersion("server omitted protocolVersion".into())
            })
            .and_then(|s| {
                ProtocolVersion::parse(s)
                    .ok_or_else(|| McpError::InvalidProtocolVersion(s.to_string()))
            })?;

        Ok(server_version.min(attempted))
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// The negotiated protocol version.
    #[must_use]
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.version
    }

    /// The server-issued session id, when one exists.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.transport.session_id()
    }

    /// Override the tools/list cache TTL.
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// The client name reported to servers.
    #[must_use]
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// List the server's tools, serving a cached copy within the TTL.
    ///
    /// # Errors
    ///
    /// Protocol errors mapped per the JSON-RPC code table.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, McpError> {
        let mut cache = self.tool_cache.lock().await;
        if let Some((stamp, tools)) = cache.as_ref()
            && stamp.elapsed() < self.cache_ttl
        {
            debug!("serving tools/list from cache");
            return Ok(tools.clone());
        }

        let request = JsonRpcRequest::new(self.id(), "tools/list", serde_json::Value::Null);
        let result = self.transport.request(request).await?.into_result()?;
        let tools: Vec<McpToolDescriptor> = result["tools"]
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|t| serde_json::from_value(t.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        *cache = Some((Instant::now(), tools.clone()));
        Ok(tools)
    }

    /// Drop the cached tool list so the next call refetches.
    pub async fn invalidate_tool_cache(&self) {
        *self.tool_cache.lock().await = None;
    }

    /// Invoke a remote tool.
    ///
    /// # Errors
    ///
    /// [`McpError::ToolNotFound`] and friends, mapped from the JSON-RPC
    /// error code.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<McpToolOutput, McpError> {
        let request = JsonRpcRequest::new(
            self.id(),
            "tools/call",
            serde_json::json!({ "name": name, "arguments": arguments }),
        );
        let result = self.transport.request(request).await?.into_result()?;
        Ok(McpToolOutput::from_result(&result))
    }

    /// Terminate the connection; streamable HTTP sends DELETE for the
    /// session. Idempotent.
    ///
    /// # Errors
    ///
    /// [`McpError::TransportError`] when the teardown request fails.
    pub async fn close(&self) -> Result<(), McpError> {
        self.transport.close().await
    }
}
