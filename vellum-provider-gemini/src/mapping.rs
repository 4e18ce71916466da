//! Request/response mapping between vellum types and the Gemini
//! generateContent API format.
//!
//! Reference: <https://ai.google.dev/api/generate-content>

use vellum_types::{
    Completion, CompletionOptions, Conversation, LlmError, Message, TokenUsage, ToolCall,
    ToolChoice, ToolDefinition,
};

// ─── Request mapping ─────────────────────────────────────────────────────────

/// Convert a conversation plus options into the request JSON body.
#[must_use]
pub fn to_api_request(
    conversation: &Conversation,
    options: &CompletionOptions,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "contents": map_contents(&conversation.messages),
    });

    let system: Vec<&str> = conversation
        .messages
        .iter()
        .filter_map(|m| match m {
            Message::System { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    if !system.is_empty() {
        body["systemInstruction"] = serde_json::json!({
            "parts": [{ "text": system.join("\n") }],
        });
    }

    let mut config = serde_json::Map::new();
    if let Some(temp) = options.temperature {
        config.insert("temperature".into(), serde_json::Value::from(temp));
    }
    if let Some(top_p) = options.top_p {
        config.insert("topP".into(), serde_json::Value::from(top_p));
    }
    if let Some(max_tokens) = options.max_tokens {
        config.insert("maxOutputTokens".into(), serde_json::Value::from(max_tokens));
    }
    if !options.stop_sequences.is_empty() {
        config.insert(
            "stopSequences".into(),
            serde_json::Value::Array(
                options
                    .stop_sequences
                    .iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            ),
        );
    }
    if !config.is_empty() {
        body["generationConfig"] = serde_json::Value::Object(config);
    }

    if !options.tools.is_empty() {
        body["tools"] = serde_json::json!([{
            "functionDeclarations": options
                .tools
                .iter()
                .map(map_tool_definition)
                .collect::<Vec<_>>(),
        }]);
    }
    if let Some(choice) = &options.tool_choice {
        body["toolConfig"] = map_tool_choice(choice);
    }

    body
}

/// Map messages to Gemini `contents`. Roles are `user`/`model`; tool
/// results become `functionResponse` parts whose function name is
/// recovered from the assistant call the result answers.
fn map_contents(messages: &[Message]) -> serde_json::Value {
    let mut arr: Vec<serde_json::Value> = Vec::new();

    for msg in messages {
        match msg {
            Message::System { .. } => {}
            Message::User { content } => arr.push(serde_json::json!({
                "role": "user",
                "parts": [{ "text": content }],
            })),
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut parts = Vec::new();
                if !content.is_empty() {
                    parts.push(serde_json::json!({ "text": content }));
                }
                for call in tool_calls {
                    parts.push(serde_json::json!({
                        "functionCall": {
                            "name": call.name,
                            "args": call.arguments,
                        },
                    }));
                }
                arr.push(serde_json::json!({ "role": "model", "parts": parts }));
            }
            Message::Tool {
                content,
                tool_call_id,
            } => {
                let name = function_name_for(messages, tool_call_id).unwrap_or("unknown");
                let response: serde_json::Value = serde_json::from_str(content)
                    .unwrap_or(serde_json::Value::String(content.clone()));
                let part = serde_json::json!({
                    "functionResponse": {
                        "name": name,
                        "response": { "content": response },
                    },
                });
                // Function responses share a user message with a
                // preceding response, mirroring how calls were grouped.
                let merged = arr.last_mut().is_some_and(|last| {
                    last["role"] == "user"
                        && last["parts"][0].get("functionResponse").is_some()
                });
                if merged {
                    if let Some(serde_json::Value::Array(parts)) =
                        arr.last_mut().map(|l| &mut l["parts"])
                    {
                        parts.push(part);
                    }
                } else {
                    arr.push(serde_json::json!({ "role": "user", "parts": [part] }));
                }
            }
        }
    }

    serde_json::Value::Array(arr)
}

/// Find the tool name a result id refers to by scanning assistant calls.
fn function_name_for<'a>(messages: &'a [Message], tool_call_id: &str) -> Option<&'a str> {
    messages.iter().rev().find_map(|m| {
        m.tool_calls()
            .iter()
            .find(|c| c.id == tool_call_id)
            .map(|c| c.name.as_str())
    })
}

fn map_tool_definition(tool: &ToolDefinition) -> serde_json::Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}

fn map_tool_choice(choice: &ToolChoice) -> serde_json::Value {
    let config = match choice {
        ToolChoice::Auto => serde_json::json!({ "mode": "AUTO" }),
        ToolChoice::None => serde_json::json!({ "mode": "NONE" }),
        ToolChoice::Required => serde_json::json!({ "mode": "ANY" }),
        ToolChoice::Specific { name } => serde_json::json!({
            "mode": "ANY",
            "allowedFunctionNames": [name],
        }),
    };
    serde_json::json!({ "functionCallingConfig": config })
}

// ─── Response mapping ─────────────────────────────────────────────────────────

/// Parse a generateContent response into a [`Completion`].
///
/// Gemini has no tool-call ids; `gemini_{n}` ids are synthesized in
/// part order.
///
/// # Errors
///
/// Returns [`LlmError::Unknown`] when `candidates` is missing or empty.
pub fn from_api_response(
    body: &serde_json::Value,
    id: String,
    created: i64,
    model: &str,
) -> Result<Completion, LlmError> {
    let candidate = body["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| LlmError::Unknown {
            message: "missing 'candidates' in response".into(),
            source: None,
        })?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    if let Some(parts) = candidate["content"]["parts"].as_array() {
        for part in parts {
            if let Some(text) = part["text"].as_str() {
                content.push_str(text);
            }
            if let Some(call) = part.get("functionCall") {
                let index = tool_calls.len();
                tool_calls.push(ToolCall {
                    id: format!("gemini_{index}"),
                    name: call["name"].as_str().unwrap_or_default().to_string(),
                    arguments: call["args"].clone(),
                });
            }
        }
    }

    Ok(Completion {
        id,
        created,
        content,
        tool_calls,
        model: body["modelVersion"]
            .as_str()
            .unwrap_or(model)
            .to_string(),
        usage: parse_usage(&body["usageMetadata"]),
    })
}

/// Parse `usageMetadata` counts.
pub(crate) fn parse_usage(usage: &serde_json::Value) -> Option<TokenUsage> {
    let prompt = usage["promptTokenCount"].as_u64()?;
    let completion = usage["candidatesTokenCount"].as_u64().unwrap_or(0);
    let total = usage["totalTokenCount"]
        .as_u64()
        .unwrap_or(prompt + completion);
    Some(TokenUsage {
        prompt_tokens: prompt as usize,
        completion_tokens: completion as usize,
        total_tokens: total as usize,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
