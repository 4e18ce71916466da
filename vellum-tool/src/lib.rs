#![deny(missing_docs)]
//! Tool definitions and the registry the agent loop executes against.
//!
//! A [`Tool`] couples a name, a typed [`ParameterSchema`], and a
//! JSON-in/JSON-out handler. The [`ToolRegistry`] validates arguments
//! against the schema before invoking the handler and exports
//! provider-facing [`ToolDefinition`]s. Execution strategies for whole
//! batches of calls live in [`execute`].

pub mod execute;
pub mod schema;

pub use execute::{ExecutionStrategy, ToolCallOutcome, execute_calls};
pub use schema::ParameterSchema;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use vellum_types::{LlmError, ToolDefinition, ToolError};

/// Object-safe async handler: JSON arguments in, JSON result out.
///
/// Handlers must be thread-safe; with a parallel execution strategy the
/// registry may run several handlers concurrently (documented
/// requirement, not enforced).
pub trait ToolHandler: Send + Sync {
    /// Execute with validated arguments.
    fn call(
        &self,
        arguments: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>>;
}

/// Wraps a plain function as a [`ToolHandler`].
struct FnHandler<F>(F);

impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Result<serde_json::Value, ToolError> + Send + Sync,
{
    fn call(
        &self,
        arguments: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
        let result = (self.0)(arguments);
        Box::pin(async move { result })
    }
}

/// A registered tool: schema plus handler.
#[derive(Clone)]
pub struct Tool {
    /// Unique name, `^[A-Za-z_][A-Za-z0-9_]*$`.
    pub name: String,
    /// Description shown to the model.
    pub description: String,
    /// Typed parameter schema.
    pub schema: ParameterSchema,
    handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Tool {
    /// Create a tool from an async handler.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ParameterSchema,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler,
        }
    }

    /// Create a tool from a synchronous function.
    #[must_use]
    pub fn from_fn<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ParameterSchema,
        f: F,
    ) -> Self
    where
        F: Fn(serde_json::Value) -> Result<serde_json::Value, ToolError>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, description, schema, Arc::new(FnHandler(f)))
    }

    /// The provider-facing definition with standard JSON Schema.
    #[must_use]
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.schema.to_json_schema(),
        }
    }

    /// The provider-facing definition with strict-mode JSON Schema.
    #[must_use]
    pub fn definition_strict(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.schema.to_json_schema_strict(),
        }
    }
}

/// Whether `name` is a legal tool name.
#[must_use]
pub fn is_valid_tool_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A request to execute one registered tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Name of the tool to invoke.
    pub function_name: String,
    /// Raw arguments from the model (may be `null`).
    pub arguments: serde_json::Value,
}

/// Holds tools by name and executes calls against them.
///
/// Insertion order is preserved for [`ToolRegistry::definitions`], so the
/// model sees tools in the order they were registered.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
    by_name: BTreeMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Validation`] for an illegal name or a
    /// duplicate registration.
    pub fn register(&mut self, tool: Tool) -> Result<(), LlmError> {
        if !is_valid_tool_name(&tool.name) {
            return Err(LlmError::Validation(format!(
                "invalid tool name '{}'",
                tool.name
            )));
        }
        if self.by_name.contains_key(&tool.name) {
            return Err(LlmError::Validation(format!(
                "tool '{}' is already registered",
                tool.name
            )));
        }
        self.by_name.insert(tool.name.clone(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.by_name.get(name).map(|&idx| &self.tools[idx])
    }

    /// Registered tool names, in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Provider-facing definitions, in insertion order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(Tool::definition).collect()
    }

    /// Provider-facing definitions with strict-mode schemas.
    #[must_use]
    pub fn definitions_strict(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(Tool::definition_strict).collect()
    }

    /// Resolve, validate, and execute one call.
    ///
    /// A `null` argument value is accepted as an empty object only when
    /// the tool's schema has no required properties. Handler panics are
    /// contained and surfaced as [`ToolError::ExecutionFailed`].
    ///
    /// # Errors
    ///
    /// [`ToolError::UnknownFunction`], [`ToolError::InvalidArguments`],
    /// or [`ToolError::ExecutionFailed`].
    pub async fn execute(
        &self,
        request: ToolCallRequest,
    ) -> Result<serde_json::Value, ToolError> {
        let tool = self
            .get(&request.function_name)
            .ok_or_else(|| ToolError::UnknownFunction(request.function_name.clone()))?;

        let arguments = if request.arguments.is_null() {
            if tool.schema.required_properties().is_empty() {
                serde_json::Value::Object(serde_json::Map::new())
            } else {
                return Err(ToolError::InvalidArguments {
                    name: tool.name.clone(),
                    message: format!(
                        "tool '{}' received null arguments; expected an object",
                        tool.name
                    ),
                });
            }
        } else {
            request.arguments
        };

        tool.schema
            .validate(&arguments)
            .map_err(|message| ToolError::InvalidArguments {
                name: tool.name.clone(),
                message,
            })?;

        let handler = Arc::clone(&tool.handler);
        let name = tool.name.clone();
        tracing::debug!(tool = %name, "executing tool");

        // Run in a task so a panicking handler is contained.
        match tokio::spawn(async move { handler.call(arguments).await }).await {
            Ok(result) => result,
            Err(join_err) => Err(ToolError::ExecutionFailed {
                name,
                message: if join_err.is_panic() {
                    "handler panicked".to_string()
                } else {
                    join_err.to_string()
                },
                cause: Some(Box::new(join_err)),
            }),
        }
    }
}
