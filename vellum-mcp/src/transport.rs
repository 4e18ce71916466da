//! MCP transports: stdio child process, plain HTTP, and streamable
//! HTTP with SSE.

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use vellum_types::McpError;

use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::types::ProtocolVersion;

/// A bidirectional JSON-RPC channel to an MCP server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for its response.
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError>;

    /// Send a notification (no response expected).
    async fn notify(&self, method: &str, params: serde_json::Value) -> Result<(), McpError>;

    /// The server-issued session id, when the transport tracks one.
    fn session_id(&self) -> Option<String> {
        None
    }

    /// Record the negotiated protocol version for subsequent headers.
    fn set_protocol_version(&self, _version: ProtocolVersion) {}

    /// Terminate the connection (and session, where applicable).
    async fn close(&self) -> Result<(), McpError>;
}

// ─── Stdio ───────────────────────────────────────────────────────────────────

/// Child-process transport: one JSON object per line on stdin/stdout.
pub struct StdioTransport {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
}

impl StdioTransport {
    /// Spawn the server process and wire up its pipes.
    ///
    /// # Errors
    ///
    /// [`McpError::TransportError`] when the process cannot be spawned
    /// or its pipes are unavailable.
    pub fn spawn(mut command: Command) -> Result<Self, McpError> {
        command
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped());
        let mut child = command
            .spawn()
            .map_err(|e| McpError::TransportError(format!("spawn failed: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::TransportError("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::TransportError("child stdout unavailable".into()))?;
        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
        })
    }

    async fn write_line(&self, value: &serde_json::Value) -> Result<(), McpError> {
        let mut line = value.to_string();
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::TransportError(format!("stdin write failed: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| McpError::TransportError(format!("stdin flush failed: {e}")))
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let id = request.id;
        let value = serde_json::to_value(&request)
            .map_err(|e| McpError::TransportError(e.to_string()))?;
        self.write_line(&value).await?;

        let mut stdout = self.stdout.lock().await;
        let mut line = String::new();
        loop {
            line.clear();
            let read = stdout
                .read_line(&mut line)
                .await
                .map_err(|e| McpError::TransportError(format!("stdout read failed: {e}")))?;
            if read == 0 {
                return Err(McpError::TransportError("server closed stdout".into()));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(response) = serde_json::from_str::<JsonRpcResponse>(trimmed) else {
                warn!("skipping unparseable stdio line");
                continue;
            };
            // Server-initiated notifications have no id; skip them.
            if response.id.as_ref().and_then(serde_json::Value::as_u64) == Some(id) {
                return Ok(response);
            }
        }
    }

    async fn notify(&self, method: &str, params: serde_json::Value) -> Result<(), McpError> {
        let mut value = serde_json::json!({ "jsonrpc": "2.0", "method": method });
        if !params.is_null() {
            value["params"] = params;
        }
        self.write_line(&value).await
    }

    async fn close(&self) -> Result<(), McpError> {
        let mut child = self.child.lock().await;
        child
            .kill()
            .await
            .map_err(|e| McpError::TransportError(format!("kill failed: {e}")))
    }
}

// ─── Plain HTTP ──────────────────────────────────────────────────────────────

/// One POST per request, JSON in and JSON out. The 2024-11-05 dialect:
/// no sessions, no SSE.
pub struct HttpTransport {
    http: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// Create a transport for the given endpoint URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let response = self
            .http
            .post(&self.url)
            .header("accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| McpError::TransportError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| McpError::TransportError(e.to_string()))?;
        if !status.is_success() {
            return Err(McpError::TransportError(format!("HTTP {status}: {text}")));
        }
        serde_json::from_str(&text)
            .map_err(|e| McpError::TransportError(format!("malformed response: {e}")))
    }

    async fn notify(&self, method: &str, params: serde_json::Value) -> Result<(), McpError> {
        let mut value = serde_json::json!({ "jsonrpc": "2.0", "method": method });
        if !params.is_null() {
            value["params"] = params;
        }
        self.http
            .post(&self.url)
            .header("accept", "application/json")
            .json(&value)
            .send()
            .await
            .map_err(|e| McpError::TransportError(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), McpError> {
        Ok(())
    }
}

// ─── Streamable HTTP ─────────────────────────────────────────────────────────

/// The modern transport: a single `/mcp` endpoint accepting POST (JSON
/// or SSE responses), GET (server-initiated SSE channel), and DELETE
/// (session termination). Session and protocol-version headers ride on
/// every request.
pub struct StreamableHttpTransport {
    http: reqwest::Client,
    url: String,
    session: StdMutex<Option<String>>,
    version: StdMutex<ProtocolVersion>,
}

impl StreamableHttpTransport {
    /// Create a transport for the `/mcp` endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>, version: ProtocolVersion) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            session: StdMutex::new(None),
            version: StdMutex::new(version),
        }
    }

    fn current_version(&self) -> ProtocolVersion {
        *self.version.lock().expect("version lock")
    }

    fn apply_headers(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req = req.header("MCP-Protocol-Version", self.current_version().as_str());
        if let Some(session) = self.session.lock().expect("session lock").clone() {
            req = req.header("mcp-session-id", session);
        }
        req
    }

    fn capture_session(&self, headers: &reqwest::header::HeaderMap) {
        if let Some(id) = headers
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
        {
            debug!(session = id, "captured MCP session");
            *self.session.lock().expect("session lock") = Some(id.to_string());
        }
    }

    /// Open the lazy server-initiated SSE channel with GET.
    ///
    /// Returns a receiver of server-pushed JSON messages. The reader
    /// task ends when the connection closes or the receiver is dropped.
    ///
    /// # Errors
    ///
    /// [`McpError::TransportError`] when the GET fails.
    pub async fn open_event_stream(
        &self,
    ) -> Result<tokio::sync::mpsc::Receiver<serde_json::Value>, McpError> {
        let response = self
            .apply_headers(self.http.get(&self.url))
            .header("accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| McpError::TransportError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(McpError::TransportError(format!(
                "SSE open failed: HTTP {}",
                response.status()
            )));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buf = String::new();
            while let Some(Ok(bytes)) = stream.next().await {
                let Ok(text) = std::str::from_utf8(&bytes) else {
                    break;
                };
                buf.push_str(text);
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim_end_matches('\r').to_string();
                    buf.drain(..=pos);
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(data.trim()) else {
                        continue;
                    };
                    if tx.send(value).await.is_err() {
                        return;
                    }
                }
            }
        });
        Ok(rx)
    }

    /// Terminate the session with DELETE.
    async fn delete_session(&self) -> Result<(), McpError> {
        let has_session = self.session.lock().expect("session lock").is_some();
        if !has_session {
            return Ok(());
        }
        self.apply_headers(self.http.delete(&self.url))
            .send()
            .await
            .map_err(|e| McpError::TransportError(e.to_string()))?;
        *self.session.lock().expect("session lock") = None;
        Ok(())
    }

    /// Find the response matching `id` in an SSE body.
    fn response_from_sse(body: &str, id: u64) -> Result<JsonRpcResponse, McpError> {
        for line in body.lines() {
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(data.trim())
                && response.id.as_ref().and_then(serde_json::Value::as_u64) == Some(id)
            {
                return Ok(response);
            }
        }
        Err(McpError::TransportError(
            "SSE body carried no matching response".into(),
        ))
    }
}

#[async_trait]
impl McpTransport for StreamableHttpTransport {
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let id = request.id;
        let response = self
            .apply_headers(self.http.post(&self.url))
            .header("accept", "application/json, text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|e| McpError::TransportError(e.to_string()))?;

        let status = response.status();
        self.capture_session(response.headers());

        if status.as_u16() == 404 && self.session_id().is_some() {
            let stale = self.session.lock().expect("session lock").take();
            return Err(McpError::SessionNotFound(stale.unwrap_or_default()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let text = response
            .text()
            .await
            .map_err(|e| McpError::TransportError(e.to_string()))?;

        if !status.is_success() {
            return Err(McpError::TransportError(format!("HTTP {status}: {text}")));
        }

        if content_type.starts_with("text/event-stream") {
            Self::response_from_sse(&text, id)
        } else {
            serde_json::from_str(&text)
                .map_err(|e| McpError::TransportError(format!("malformed response: {e}")))
        }
    }

    async fn notify(&self, method: &str, params: serde_json::Value) -> Result<(), McpError> {
        let mut value = serde_json::json!({ "jsonrpc": "2.0", "method": method });
        if !params.is_null() {
            value["params"] = params;
        }
        self.apply_headers(self.http.post(&self.url))
            .header("accept", "application/json, text/event-stream")
            .json(&value)
            .send()
            .await
            .map_err(|e| McpError::TransportError(e.to_string()))?;
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.session.lock().expect("session lock").clone()
    }

    fn set_protocol_version(&self, version: ProtocolVersion) {
        *self.version.lock().expect("version lock") = version;
    }

    async fn close(&self) -> Result<(), McpError> {
        self.delete_session().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_body_resolves_matching_id() {
        let body = "event: message\n\
data: {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{\"ok\":false}}\n\
\n\
data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"ok\":true}}\n\n";
        let response = StreamableHttpTransport::response_from_sse(body, 7).unwrap();
        assert_eq!(response.result.unwrap()["ok"], true);
    }

    #[test]
    fn sse_body_without_match_is_an_error() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n";
        assert!(StreamableHttpTransport::response_from_sse(body, 9).is_err());
    }
}
