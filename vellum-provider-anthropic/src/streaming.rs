//! SSE streaming for the Anthropic Messages API.
//!
//! Anthropic streams typed events (`message_start`,
//! `content_block_start`, `content_block_delta`, `message_delta`, ...).
//! Text deltas and tool-input fragments map onto [`StreamedChunk`]s;
//! block indexes key the partial tool calls.
//!
//! Reference: <https://docs.anthropic.com/en/api/messages-streaming>

use vellum_types::{LlmError, PartialToolCall, StreamedChunk, TokenUsage};

/// Accumulated SSE parser state across events.
#[derive(Debug, Default)]
pub(crate) struct SseState {
    event_type: Option<String>,
    data: String,
    /// Response id from `message_start`.
    pub id: String,
    /// Model from `message_start`.
    pub model: String,
    /// Input tokens from `message_start`, output from `message_delta`.
    pub usage: Option<TokenUsage>,
    input_tokens: usize,
}

impl SseState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Process one SSE line; a blank line dispatches the pending event.
    pub(crate) fn process_line(&mut self, line: &str) -> Result<Vec<StreamedChunk>, LlmError> {
        if line.is_empty() {
            return self.dispatch();
        }
        if let Some(event) = line.strip_prefix("event:") {
            self.event_type = Some(event.trim().to_string());
        } else if let Some(data) = line.strip_prefix("data:") {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(data.trim());
        }
        Ok(Vec::new())
    }

    fn dispatch(&mut self) -> Result<Vec<StreamedChunk>, LlmError> {
        let Some(event_type) = self.event_type.take() else {
            self.data.clear();
            return Ok(Vec::new());
        };
        let data = std::mem::take(&mut self.data);
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let json: serde_json::Value =
            serde_json::from_str(&data).map_err(|e| LlmError::Unknown {
                message: format!("malformed stream event: {e}"),
                source: Some(Box::new(e)),
            })?;

        match event_type.as_str() {
            "message_start" => {
                let message = &json["message"];
                if let Some(id) = message["id"].as_str() {
                    self.id = id.to_string();
                }
                if let Some(model) = message["model"].as_str() {
                    self.model = model.to_string();
                }
                self.input_tokens =
                    message["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize;
                Ok(Vec::new())
            }
            "content_block_start" => {
                let index = json["index"].as_u64().unwrap_or(0) as usize;
                let block = &json["content_block"];
                if block["type"].as_str() == Some("tool_use") {
                    return Ok(vec![StreamedChunk::tool_fragment(PartialToolCall {
                        index,
                        id: block["id"].as_str().map(str::to_string),
                        name: block["name"].as_str().map(str::to_string),
                        arguments_fragment: String::new(),
                    })]);
                }
                Ok(Vec::new())
            }
            "content_block_delta" => {
                let index = json["index"].as_u64().unwrap_or(0) as usize;
                let delta = &json["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => {
                        let text = delta["text"].as_str().unwrap_or_default();
                        if text.is_empty() {
                            Ok(Vec::new())
                        } else {
                            Ok(vec![StreamedChunk::text(text)])
                        }
                    }
                    Some("input_json_delta") => {
                        Ok(vec![StreamedChunk::tool_fragment(PartialToolCall {
                            index,
                            id: None,
                            name: None,
                            arguments_fragment: delta["partial_json"]
                                .as_str()
                                .unwrap_or_default()
                                .to_string(),
                        })])
                    }
                    _ => Ok(Vec::new()),
                }
            }
            "message_delta" => {
                let mut chunks = Vec::new();
                if let Some(reason) = json["delta"]["stop_reason"].as_str() {
                    chunks.push(StreamedChunk::finish(reason));
                }
                if let Some(output) = json["usage"]["output_tokens"].as_u64() {
                    self.usage = Some(TokenUsage::new(self.input_tokens, output as usize));
                }
                Ok(chunks)
            }
            "error" => {
                let message = json["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown streaming error")
                    .to_string();
                Err(LlmError::Unknown {
                    message,
                    source: None,
                })
            }
            // ping, content_block_stop, message_stop carry nothing we need
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_types::ChunkAccumulator;

    fn feed(state: &mut SseState, sse: &str) -> Vec<StreamedChunk> {
        let mut chunks = Vec::new();
        for line in sse.lines() {
            chunks.extend(state.process_line(line).unwrap());
        }
        chunks.extend(state.process_line("").unwrap());
        chunks
    }

    #[test]
    fn text_deltas_stream_in_order() {
        let mut state = SseState::new();
        let sse = "event: message_start\n\
data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude-sonnet-4-20250514\",\"usage\":{\"input_tokens\":12}}}\n\
\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello \"}}\n\
\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"world\"}}\n\
\n\
event: message_delta\n\
data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":4}}\n";
        let chunks = feed(&mut state, sse);

        let mut acc = ChunkAccumulator::new();
        for chunk in &chunks {
            acc.push(chunk);
        }
        if let Some(usage) = state.usage {
            acc.set_usage(usage);
        }
        let completion = acc.into_completion(state.id.clone(), state.model.clone(), 0);
        assert_eq!(completion.content, "Hello world");
        assert_eq!(completion.id, "msg_1");
        let usage = completion.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 4);
    }

    #[test]
    fn tool_use_blocks_assemble_from_fragments() {
        let mut state = SseState::new();
        let sse = "event: content_block_start\n\
data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"get_weather\",\"input\":{}}}\n\
\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"location\\\":\"}}\n\
\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"Paris\\\"}\"}}\n\
\n\
event: message_delta\n\
data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":9}}\n";
        let chunks = feed(&mut state, sse);

        let mut acc = ChunkAccumulator::new();
        for chunk in &chunks {
            acc.push(chunk);
        }
        assert_eq!(acc.finish_reason(), Some("tool_use"));
        let completion = acc.into_completion("id".into(), "m".into(), 0);
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].id, "toolu_1");
        assert_eq!(
            completion.tool_calls[0].arguments,
            serde_json::json!({"location": "Paris"})
        );
    }

    #[test]
    fn error_event_surfaces_as_error() {
        let mut state = SseState::new();
        state
            .process_line("event: error")
            .and_then(|_| {
                state.process_line(
                    r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
                )
            })
            .unwrap();
        let err = state.process_line("").unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
    }

    #[test]
    fn ping_and_stop_events_are_silent() {
        let mut state = SseState::new();
        let sse = "event: ping\ndata: {}\n\nevent: message_stop\ndata: {\"type\":\"message_stop\"}\n";
        assert!(feed(&mut state, sse).is_empty());
    }
}
