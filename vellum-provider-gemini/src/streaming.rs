//! SSE streaming for `streamGenerateContent?alt=sse`.
//!
//! Each `data:` line is a full GenerateContentResponse chunk; text
//! arrives as part deltas, function calls arrive whole, and the final
//! chunk carries `usageMetadata` and `finishReason`.

use vellum_types::{LlmError, PartialToolCall, StreamedChunk, TokenUsage};

use crate::mapping::parse_usage;

/// Parser state across SSE chunks.
#[derive(Debug, Default)]
pub(crate) struct SseState {
    /// Model version reported by the stream.
    pub model: String,
    /// Usage from the final chunk.
    pub usage: Option<TokenUsage>,
    tool_index: usize,
}

impl SseState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Parse one SSE line into deltas.
    pub(crate) fn process_line(&mut self, line: &str) -> Result<Vec<StreamedChunk>, LlmError> {
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(Vec::new());
        };
        let data = data.trim();
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let json: serde_json::Value = serde_json::from_str(data).map_err(|e| LlmError::Unknown {
            message: format!("malformed stream chunk: {e}"),
            source: Some(Box::new(e)),
        })?;

        if let Some(model) = json["modelVersion"].as_str() {
            self.model = model.to_string();
        }
        if let Some(usage) = parse_usage(&json["usageMetadata"]) {
            self.usage = Some(usage);
        }

        let Some(candidate) = json["candidates"].as_array().and_then(|c| c.first()) else {
            return Ok(Vec::new());
        };

        let mut chunks = Vec::new();
        if let Some(parts) = candidate["content"]["parts"].as_array() {
            for part in parts {
                if let Some(text) = part["text"].as_str()
                    && !text.is_empty()
                {
                    chunks.push(StreamedChunk::text(text));
                }
                if let Some(call) = part.get("functionCall") {
                    let index = self.tool_index;
                    self.tool_index += 1;
                    chunks.push(StreamedChunk::tool_fragment(PartialToolCall {
                        index,
                        id: Some(format!("gemini_{index}")),
                        name: call["name"].as_str().map(str::to_string),
                        arguments_fragment: call["args"].to_string(),
                    }));
                }
            }
        }

        if let Some(reason) = candidate["finishReason"].as_str() {
            chunks.push(StreamedChunk::finish(reason.to_lowercase()));
        }

        Ok(chunks)
    }
}
