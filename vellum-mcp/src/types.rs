//! MCP protocol data types.

use serde::{Deserialize, Serialize};

/// MCP protocol versions this client speaks, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// Plain JSON-RPC over HTTP, no sessions.
    V2024_11_05,
    /// First streamable-HTTP revision.
    V2025_03_26,
    /// Current streamable-HTTP revision.
    V2025_06_18,
}

impl ProtocolVersion {
    /// The wire string for this version.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V2024_11_05 => "2024-11-05",
            Self::V2025_03_26 => "2025-03-26",
            Self::V2025_06_18 => "2025-06-18",
        }
    }

    /// Parse a wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "2024-11-05" => Some(Self::V2024_11_05),
            "2025-03-26" => Some(Self::V2025_03_26),
            "2025-06-18" => Some(Self::V2025_06_18),
            _ => None,
        }
    }

    /// Whether servers on this version issue `mcp-session-id`.
    #[must_use]
    pub fn has_sessions(&self) -> bool {
        *self >= Self::V2025_03_26
    }
}

/// A tool advertised by an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolDescriptor {
    /// Tool name.
    pub name: String,
    /// Description, when provided.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema of the input.
    #[serde(rename = "inputSchema", default)]
    pub input_schema: serde_json::Value,
}

/// A resource reference attached to a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAnnotation {
    /// Resource URI.
    pub uri: String,
    /// Media type, when provided.
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Parsed output of `tools/call`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct McpToolOutput {
    /// Concatenated text blocks.
    pub text: String,
    /// Structured resource annotations.
    pub resources: Vec<ResourceAnnotation>,
    /// Whether the server flagged the result as an error.
    pub is_error: bool,
}

impl McpToolOutput {
    /// Parse the `content` array of a `tools/call` result.
    #[must_use]
    pub fn from_result(result: &serde_json::Value) -> Self {
        let mut output = Self {
            is_error: result["isError"].as_bool().unwrap_or(false),
            ..Self::default()
        };

        if let Some(blocks) = result["content"].as_array() {
            let mut texts: Vec<&str> = Vec::new();
            for block in blocks {
                match block["type"].as_str() {
                    Some("text") => {
                        if let Some(text) = block["text"].as_str() {
                            texts.push(text);
                        }
                    }
                    Some("resource") => {
                        let resource = &block["resource"];
                        if let Some(uri) = resource["uri"].as_str() {
                            output.resources.push(ResourceAnnotation {
                                uri: uri.to_string(),
                                mime_type: resource["mimeType"]
                                    .as_str()
                                    .or(resource["type"].as_str())
                                    .map(str::to_string),
                            });
                        }
                    }
                    _ => {}
                }
            }
            output.text = texts.join("\n");
        }

        output
    }
}
