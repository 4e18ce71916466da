//! JSON-RPC 2.0 envelope types and MCP error-code mapping.

use serde::{Deserialize, Serialize};
use vellum_types::McpError;

/// A JSON-RPC request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Request id for response correlation.
    pub id: u64,
    /// Method name (`initialize`, `tools/list`, `tools/call`, ...).
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    /// Build a request.
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC response or error.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    /// Echoed request id (absent on notifications).
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    /// Result on success.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Error on failure.
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    /// Extract the result, mapping protocol errors.
    ///
    /// # Errors
    ///
    /// The mapped [`McpError`] when the response carries an error, or
    /// [`McpError::ServerError`] when neither result nor error is
    /// present.
    pub fn into_result(self) -> Result<serde_json::Value, McpError> {
        if let Some(error) = self.error {
            return Err(error.into_mcp_error());
        }
        self.result
            .ok_or_else(|| McpError::ServerError("response carried neither result nor error".into()))
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    /// Map JSON-RPC codes onto the MCP error taxonomy.
    ///
    /// `-32601` method not found, `-32602` invalid params, `-32000`
    /// server error, `-32001` tool not found; the custom
    /// `INVALID_PROTOCOL_VERSION` marker (in message or data) wins over
    /// the numeric code.
    #[must_use]
    pub fn into_mcp_error(self) -> McpError {
        let mentions_protocol = self.message.contains("INVALID_PROTOCOL_VERSION")
            || self
                .data
                .as_ref()
                .is_some_and(|d| d.to_string().contains("INVALID_PROTOCOL_VERSION"));
        if mentions_protocol {
            return McpError::InvalidProtocolVersion(self.message);
        }
        match self.code {
            -32601 => McpError::MethodNotFound(self.message),
            -32602 => McpError::InvalidParams(self.message),
            -32001 => McpError::ToolNotFound(self.message),
            -32000 => McpError::ServerError(self.message),
            code => McpError::ServerError(format!("code {code}: {}", self.message)),
        }
    }
}
