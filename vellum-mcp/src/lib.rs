#![deny(missing_docs)]
//! Model Context Protocol client.
//!
//! Speaks JSON-RPC 2.0 to MCP servers over three transports: a spawned
//! child process (stdio), plain HTTP POST, and streamable HTTP (single
//! `/mcp` endpoint with POST/GET/DELETE and SSE). Connection setup
//! walks an explicit fallback ladder of protocol versions; sessions are
//! tracked via the `mcp-session-id` header. Remote tools bridge into a
//! [`vellum_tool::ToolRegistry`] with local tools winning name
//! collisions.

pub mod bridge;
pub mod client;
pub mod jsonrpc;
pub mod transport;
pub mod types;

pub use bridge::McpToolSource;
pub use client::{McpClient, TOOL_CACHE_TTL};
pub use types::{McpToolDescriptor, McpToolOutput, ProtocolVersion, ResourceAnnotation};
