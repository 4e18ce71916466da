//! Request/response mapping between vellum types and the OpenAI Chat
//! Completions wire format.
//!
//! Reference: <https://platform.openai.com/docs/api-reference/chat>

use vellum_types::{
    Completion, CompletionOptions, Conversation, LlmError, Message, ReasoningEffort, TokenUsage,
    ToolCall, ToolChoice, ToolDefinition,
};

// ─── Request mapping ─────────────────────────────────────────────────────────

/// Convert a conversation plus options into the request JSON body.
///
/// The returned value does **not** include `"stream"` - callers add it.
#[must_use]
pub fn to_api_request(
    conversation: &Conversation,
    options: &CompletionOptions,
    model: &str,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": map_messages(&conversation.messages),
    });

    if let Some(temp) = options.temperature {
        body["temperature"] = serde_json::Value::from(temp);
    }
    if let Some(top_p) = options.top_p {
        body["top_p"] = serde_json::Value::from(top_p);
    }
    if let Some(max_tokens) = options.max_tokens {
        body["max_tokens"] = serde_json::Value::from(max_tokens);
    }
    if !options.stop_sequences.is_empty() {
        body["stop"] = serde_json::Value::Array(
            options
                .stop_sequences
                .iter()
                .map(|s| serde_json::Value::String(s.clone()))
                .collect(),
        );
    }
    if !options.tools.is_empty() {
        body["tools"] = serde_json::Value::Array(
            options.tools.iter().map(map_tool_definition).collect(),
        );
    }
    if let Some(choice) = &options.tool_choice {
        body["tool_choice"] = map_tool_choice(choice);
    }
    if let Some(effort) = &options.reasoning_effort {
        body["reasoning_effort"] = serde_json::Value::String(
            match effort {
                ReasoningEffort::Low => "low",
                ReasoningEffort::Medium => "medium",
                ReasoningEffort::High => "high",
            }
            .into(),
        );
    }

    body
}

/// Map messages to the OpenAI array. Assistant tool calls become the
/// `tool_calls` array with stringified arguments; assistant content is
/// `null` when empty and tools were called.
fn map_messages(messages: &[Message]) -> serde_json::Value {
    let arr: Vec<serde_json::Value> = messages
        .iter()
        .map(|msg| match msg {
            Message::System { content } => serde_json::json!({
                "role": "system",
                "content": content,
            }),
            Message::User { content } => serde_json::json!({
                "role": "user",
                "content": content,
            }),
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut obj = serde_json::json!({ "role": "assistant" });
                obj["content"] = if content.is_empty() && !tool_calls.is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::Value::String(content.clone())
                };
                if !tool_calls.is_empty() {
                    obj["tool_calls"] = serde_json::Value::Array(
                        tool_calls.iter().map(map_tool_call).collect(),
                    );
                }
                obj
            }
            Message::Tool {
                content,
                tool_call_id,
            } => serde_json::json!({
                "role": "tool",
                "content": content,
                "tool_call_id": tool_call_id,
            }),
        })
        .collect();
    serde_json::Value::Array(arr)
}

fn map_tool_call(call: &ToolCall) -> serde_json::Value {
    let arguments = match &call.arguments {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    serde_json::json!({
        "id": call.id,
        "type": "function",
        "function": {
            "name": call.name,
            "arguments": arguments,
        },
    })
}

fn map_tool_definition(tool: &ToolDefinition) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}

fn map_tool_choice(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Auto => serde_json::Value::String("auto".into()),
        ToolChoice::None => serde_json::Value::String("none".into()),
        ToolChoice::Required => serde_json::Value::String("required".into()),
        ToolChoice::Specific { name } => serde_json::json!({
            "type": "function",
            "function": { "name": name },
        }),
    }
}

// ─── Response mapping ─────────────────────────────────────────────────────────

/// Parse a non-streaming chat completion response.
///
/// # Errors
///
/// Returns [`LlmError::Unknown`] when required fields are missing.
pub fn from_api_response(body: &serde_json::Value) -> Result<Completion, LlmError> {
    let choice = body["choices"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| missing("choices"))?;
    let message = &choice["message"];

    let content = message["content"].as_str().unwrap_or_default().to_string();

    let tool_calls = match message["tool_calls"].as_array() {
        Some(calls) => calls
            .iter()
            .map(parse_tool_call)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(Completion {
        id: body["id"].as_str().unwrap_or_default().to_string(),
        created: body["created"].as_i64().unwrap_or_default(),
        content,
        tool_calls,
        model: body["model"].as_str().unwrap_or_default().to_string(),
        usage: parse_usage(&body["usage"]),
    })
}

/// Parse one entry of the `tool_calls` array.
fn parse_tool_call(value: &serde_json::Value) -> Result<ToolCall, LlmError> {
    let function = &value["function"];
    let name = function["name"]
        .as_str()
        .ok_or_else(|| missing("tool_calls[].function.name"))?
        .to_string();
    let raw_args = function["arguments"].as_str().unwrap_or("{}");
    let arguments = serde_json::from_str(raw_args)
        .unwrap_or(serde_json::Value::String(raw_args.to_string()));
    Ok(ToolCall {
        id: value["id"].as_str().unwrap_or_default().to_string(),
        name,
        arguments,
    })
}

/// Parse the `usage` object, when present.
pub(crate) fn parse_usage(usage: &serde_json::Value) -> Option<TokenUsage> {
    let prompt = usage["prompt_tokens"].as_u64()?;
    let completion = usage["completion_tokens"].as_u64().unwrap_or(0);
    let total = usage["total_tokens"]
        .as_u64()
        .unwrap_or(prompt + completion);
    Some(TokenUsage {
        prompt_tokens: prompt as usize,
        completion_tokens: completion as usize,
        total_tokens: total as usize,
    })
}

fn missing(field: &str) -> LlmError {
    LlmError::Unknown {
        message: format!("missing '{field}' in response"),
        source: None,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
