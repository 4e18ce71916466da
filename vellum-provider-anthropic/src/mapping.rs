//! Request/response mapping between vellum types and the Anthropic
//! Messages API format.
//!
//! Reference: <https://docs.anthropic.com/en/api/messages>

use vellum_types::{
    Completion, CompletionOptions, Conversation, LlmError, Message, TokenUsage, ToolCall,
    ToolChoice, ToolDefinition,
};

/// Output tokens requested when the caller sets no limit (Anthropic
/// requires `max_tokens`).
const DEFAULT_MAX_TOKENS: usize = 4096;

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
        "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });

    // System messages lift out of the conversation into the system field.
    let system: Vec<&str> = conversation
        .messages
        .iter()
        .filter_map(|m| match m {
            Message::System { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    if !system.is_empty() {
        body["system"] = serde_json::Value::String(system.join("\n"));
    }

    if let Some(temp) = options.temperature {
        body["temperature"] = serde_json::Value::from(temp);
    }
    if let Some(top_p) = options.top_p {
        body["top_p"] = serde_json::Value::from(top_p);
    }
    if !options.stop_sequences.is_empty() {
        body["stop_sequences"] = serde_json::Value::Array(
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

    body
}

/// Map non-system messages to Anthropic's message array. Consecutive
/// tool results merge into one user message, since they answer the same
/// assistant turn.
fn map_messages(messages: &[Message]) -> serde_json::Value {
    let mut arr: Vec<serde_json::Value> = Vec::new();

    for msg in messages {
        match msg {
            Message::System { .. } => {}
            Message::User { content } => arr.push(serde_json::json!({
                "role": "user",
                "content": [{ "type": "text", "text": content }],
            })),
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut blocks = Vec::new();
                if !content.is_empty() {
                    blocks.push(serde_json::json!({ "type": "text", "text": content }));
                }
                for call in tool_calls {
                    blocks.push(serde_json::json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                arr.push(serde_json::json!({ "role": "assistant", "content": blocks }));
            }
            Message::Tool {
                content,
                tool_call_id,
            } => {
                let block = serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": content,
                });
                // Append to a trailing tool-result user message if present.
                let merged = arr.last_mut().is_some_and(|last| {
                    last["role"] == "user"
                        && last["content"][0]["type"] == "tool_result"
                });
                if merged {
                    if let Some(serde_json::Value::Array(blocks)) =
                        arr.last_mut().map(|l| &mut l["content"])
                    {
                        blocks.push(block);
                    }
                } else {
                    arr.push(serde_json::json!({ "role": "user", "content": [block] }));
                }
            }
        }
    }

    serde_json::Value::Array(arr)
}

fn map_tool_definition(tool: &ToolDefinition) -> serde_json::Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

fn map_tool_choice(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Auto => serde_json::json!({ "type": "auto" }),
        ToolChoice::None => serde_json::json!({ "type": "none" }),
        ToolChoice::Required => serde_json::json!({ "type": "any" }),
        ToolChoice::Specific { name } => serde_json::json!({ "type": "tool", "name": name }),
    }
}

// ─── Response mapping ─────────────────────────────────────────────────────────

/// Parse a Messages API response into a [`Completion`].
///
/// # Errors
///
/// Returns [`LlmError::Unknown`] when required fields are missing.
pub fn from_api_response(body: &serde_json::Value, created: i64) -> Result<Completion, LlmError> {
    let content_arr = body["content"]
        .as_array()
        .ok_or_else(|| missing("content"))?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for block in content_arr {
        match block["type"].as_str() {
            Some("text") => content.push_str(block["text"].as_str().unwrap_or_default()),
            Some("tool_use") => tool_calls.push(ToolCall {
                id: block["id"]
                    .as_str()
                    .ok_or_else(|| missing("content[].id"))?
                    .to_string(),
                name: block["name"]
                    .as_str()
                    .ok_or_else(|| missing("content[].name"))?
                    .to_string(),
                arguments: block["input"].clone(),
            }),
            _ => {}
        }
    }

    Ok(Completion {
        id: body["id"].as_str().unwrap_or_default().to_string(),
        created,
        content,
        tool_calls,
        model: body["model"].as_str().unwrap_or_default().to_string(),
        usage: parse_usage(&body["usage"]),
    })
}

/// Parse Anthropic's input/output token usage.
pub(crate) fn parse_usage(usage: &serde_json::Value) -> Option<TokenUsage> {
    let input = usage["input_tokens"].as_u64()?;
    let output = usage["output_tokens"].as_u64().unwrap_or(0);
    Some(TokenUsage::new(input as usize, output as usize))
}

fn missing(field: &str) -> LlmError {
    LlmError::Unknown {
        message: format!("missing '{field}' in response"),
        source: None,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
