//! Completion request options and response types.

use serde::{Deserialize, Serialize};

use crate::message::ToolCall;

/// Token accounting for a single completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub prompt_tokens: usize,
    /// Tokens in the generated completion.
    pub completion_tokens: usize,
    /// Total tokens. Equals prompt + completion unless the provider
    /// reports otherwise.
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Build usage from prompt and completion counts, deriving the total.
    #[must_use]
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Add another usage sample into this one.
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A completed (non-streaming or fully assembled) model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Provider-assigned response id.
    pub id: String,
    /// Unix timestamp of creation.
    pub created: i64,
    /// Generated text (empty when only tools were called).
    pub content: String,
    /// Tool calls requested by the model.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// The model that produced the response.
    pub model: String,
    /// Token usage, when the provider reports it.
    pub usage: Option<TokenUsage>,
}

impl Completion {
    /// Whether the model requested any tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Tool selection strategy passed to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolChoice {
    /// The model decides whether to call tools.
    Auto,
    /// The model must not call tools.
    None,
    /// The model must call at least one tool.
    Required,
    /// The model must call the named tool.
    Specific {
        /// Name of the required tool.
        name: String,
    },
}

/// Reasoning effort hint for models that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    /// Minimal reasoning.
    Low,
    /// Moderate reasoning.
    Medium,
    /// Maximum reasoning.
    High,
}

/// Provider-facing description of a tool: name, description, and the
/// JSON Schema of its parameters (emitted by the tool registry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// What the tool does, for the model.
    pub description: String,
    /// JSON Schema of the input parameters.
    pub parameters: serde_json::Value,
}

/// Options controlling a completion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Nucleus sampling parameter.
    pub top_p: Option<f64>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<usize>,
    /// Tools available to the model.
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    /// Tool selection strategy.
    pub tool_choice: Option<ToolChoice>,
    /// Sequences that stop generation.
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    /// Reasoning effort hint.
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl CompletionOptions {
    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the nucleus sampling parameter.
    #[must_use]
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set the max output token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the available tools.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the tool selection strategy.
    #[must_use]
    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    /// Set the stop sequences.
    #[must_use]
    pub fn with_stop_sequences(mut self, stop_sequences: Vec<String>) -> Self {
        self.stop_sequences = stop_sequences;
        self
    }

    /// Set the reasoning effort hint.
    #[must_use]
    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_new_derives_total() {
        let usage = TokenUsage::new(10, 1);
        assert_eq!(usage.total_tokens, 11);
    }

    #[test]
    fn usage_add_accumulates() {
        let mut total = TokenUsage::new(10, 5);
        total.add(&TokenUsage::new(7, 3));
        assert_eq!(total.prompt_tokens, 17);
        assert_eq!(total.completion_tokens, 8);
        assert_eq!(total.total_tokens, 25);
    }

    #[test]
    fn options_builder_chains() {
        let opts = CompletionOptions::default()
            .with_temperature(0.2)
            .with_max_tokens(256)
            .with_stop_sequences(vec!["END".into()]);
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(256));
        assert_eq!(opts.stop_sequences, vec!["END".to_string()]);
        assert!(opts.tools.is_empty());
    }

    #[test]
    fn completion_roundtrip() {
        let completion = Completion {
            id: "cmpl_1".into(),
            created: 1_700_000_000,
            content: "4".into(),
            tool_calls: vec![],
            model: "gpt-4o".into(),
            usage: Some(TokenUsage::new(10, 1)),
        };
        let val = serde_json::to_value(&completion).unwrap();
        let back: Completion = serde_json::from_value(val).unwrap();
        assert_eq!(completion, back);
        assert!(!back.has_tool_calls());
    }
}
