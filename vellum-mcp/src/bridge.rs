//! Bridging remote MCP tools into the local tool registry.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;
use vellum_tool::{ParameterSchema, Tool, ToolHandler, ToolRegistry};
use vellum_types::{LlmError, ToolError};

use crate::client::McpClient;
use crate::types::McpToolDescriptor;

/// Exposes a connected server's tools as registry entries.
///
/// Remote input schemas convert to [`ParameterSchema`] best effort;
/// fields the conversion cannot express stay unvalidated and pass
/// through to the server, which validates authoritatively.
pub struct McpToolSource {
    client: Arc<McpClient>,
}

impl McpToolSource {
    /// Wrap a connected client.
    #[must_use]
    pub fn new(client: Arc<McpClient>) -> Self {
        Self { client }
    }

    /// Fetch the server's tools as registry-ready [`Tool`]s.
    ///
    /// # Errors
    ///
    /// Propagates `tools/list` failures as [`LlmError::Mcp`].
    pub async fn tools(&self) -> Result<Vec<Tool>, LlmError> {
        let descriptors = self.client.list_tools().await?;
        Ok(descriptors
            .into_iter()
            .map(|descriptor| self.tool_from_descriptor(descriptor))
            .collect())
    }

    /// Register the server's tools, skipping names the registry already
    /// has - local tools win collisions.
    ///
    /// Returns the names actually registered.
    ///
    /// # Errors
    ///
    /// Propagates `tools/list` failures; registration of a fetched tool
    /// never fails (collisions are skipped, and server-side names that
    /// are illegal locally are skipped too).
    pub async fn merge_into(&self, registry: &mut ToolRegistry) -> Result<Vec<String>, LlmError> {
        let mut added = Vec::new();
        for tool in self.tools().await? {
            if registry.get(&tool.name).is_some() {
                debug!(tool = %tool.name, "local tool wins name collision");
                continue;
            }
            let name = tool.name.clone();
            if registry.register(tool).is_ok() {
                added.push(name);
            }
        }
        Ok(added)
    }

    fn tool_from_descriptor(&self, descriptor: McpToolDescriptor) -> Tool {
        let schema = ParameterSchema::from_json_schema(&descriptor.input_schema)
            .unwrap_or_else(ParameterSchema::empty_object);
        Tool::new(
            descriptor.name.clone(),
            descriptor.description.unwrap_or_default(),
            schema,
            Arc::new(RemoteToolHandler {
                client: Arc::clone(&self.client),
                name: descriptor.name,
            }),
        )
    }
}

/// Handler that forwards calls to the MCP server.
struct RemoteToolHandler {
    client: Arc<McpClient>,
    name: String,
}

impl ToolHandler for RemoteToolHandler {
    fn call(
        &self,
        arguments: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let output = self
                .client
                .call_tool(&self.name, arguments)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    name: self.name.clone(),
                    message: e.to_string(),
                    cause: Some(Box::new(e)),
                })?;

            if output.is_error {
                return Err(ToolError::ExecutionFailed {
                    name: self.name.clone(),
                    message: output.text,
                    cause: None,
                });
            }

            // Text plus resource annotations as a structured value.
            let mut result = serde_json::json!({ "text": output.text });
            if !output.resources.is_empty() {
                result["resources"] = serde_json::to_value(&output.resources)
                    .unwrap_or(serde_json::Value::Null);
            }
            Ok(result)
        })
    }
}
