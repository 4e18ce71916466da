//! Request/response mapping between vellum types and the Ollama chat API.
//!
//! Reference: <https://github.com/ollama/ollama/blob/main/docs/api.md>

use vellum_types::{
    Completion, CompletionOptions, Conversation, LlmError, Message, TokenUsage, ToolCall,
    ToolDefinition,
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

    let mut opts = serde_json::Map::new();
    if let Some(temp) = options.temperature {
        opts.insert("temperature".into(), serde_json::Value::from(temp));
    }
    if let Some(top_p) = options.top_p {
        opts.insert("top_p".into(), serde_json::Value::from(top_p));
    }
    if let Some(max_tokens) = options.max_tokens {
        opts.insert("num_predict".into(), serde_json::Value::from(max_tokens));
    }
    if !options.stop_sequences.is_empty() {
        opts.insert(
            "stop".into(),
            serde_json::Value::Array(
                options
                    .stop_sequences
                    .iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            ),
        );
    }
    if !opts.is_empty() {
        body["options"] = serde_json::Value::Object(opts);
    }

    if !options.tools.is_empty() {
        body["tools"] = serde_json::Value::Array(
            options.tools.iter().map(map_tool_definition).collect(),
        );
    }

    body
}

/// Map messages to Ollama's array. Content is always a plain string -
/// empty when the assistant only called tools, never null.
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
                let mut obj = serde_json::json!({
                    "role": "assistant",
                    "content": content,
                });
                if !tool_calls.is_empty() {
                    obj["tool_calls"] = serde_json::Value::Array(
                        tool_calls
                            .iter()
                            .map(|call| {
                                serde_json::json!({
                                    "function": {
                                        "name": call.name,
                                        "arguments": call.arguments,
                                    },
                                })
                            })
                            .collect(),
                    );
                }
                obj
            }
            Message::Tool { content, .. } => serde_json::json!({
                "role": "tool",
                "content": content,
            }),
        })
        .collect();
    serde_json::Value::Array(arr)
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

// ─── Response mapping ─────────────────────────────────────────────────────────

/// Parse a non-streaming chat response.
///
/// Ollama tool calls carry no id; `ollama_{n}` ids are synthesized in
/// call order so tool results can reference them.
///
/// # Errors
///
/// Returns [`LlmError::Unknown`] when the `message` object is missing.
pub fn from_api_response(
    body: &serde_json::Value,
    id: String,
    created: i64,
) -> Result<Completion, LlmError> {
    let message = body
        .get("message")
        .filter(|m| m.is_object())
        .ok_or_else(|| LlmError::Unknown {
            message: "missing 'message' in response".into(),
            source: None,
        })?;

    let content = message["content"].as_str().unwrap_or_default().to_string();

    let tool_calls = match message["tool_calls"].as_array() {
        Some(calls) => calls
            .iter()
            .enumerate()
            .map(|(idx, call)| parse_tool_call(call, idx))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(Completion {
        id,
        created,
        content,
        tool_calls,
        model: body["model"].as_str().unwrap_or_default().to_string(),
        usage: parse_usage(body),
    })
}

/// Parse one tool call, synthesizing its id from `index`.
pub(crate) fn parse_tool_call(
    call: &serde_json::Value,
    index: usize,
) -> Result<ToolCall, LlmError> {
    let function = &call["function"];
    let name = function["name"]
        .as_str()
        .ok_or_else(|| LlmError::Unknown {
            message: "tool call missing 'function.name'".into(),
            source: None,
        })?
        .to_string();
    Ok(ToolCall {
        id: format!("ollama_{index}"),
        name,
        arguments: function["arguments"].clone(),
    })
}

/// Usage from `prompt_eval_count` / `eval_count` on the final object.
pub(crate) fn parse_usage(body: &serde_json::Value) -> Option<TokenUsage> {
    let prompt = body["prompt_eval_count"].as_u64()?;
    let completion = body["eval_count"].as_u64().unwrap_or(0);
    Some(TokenUsage::new(prompt as usize, completion as usize))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
