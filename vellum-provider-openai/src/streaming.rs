//! SSE streaming for the Chat Completions wire format.
//!
//! OpenAI streams `data:` lines, one JSON chunk each, terminated by the
//! `[DONE]` sentinel. Tool-call arguments arrive as string fragments
//! keyed by the call's `index`.

use vellum_types::{LlmError, PartialToolCall, StreamedChunk, TokenUsage};

/// Buffers raw bytes and yields complete lines across chunk boundaries.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append bytes; return the complete lines they close.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, LlmError> {
        let text = std::str::from_utf8(bytes).map_err(|e| LlmError::Unknown {
            message: format!("invalid UTF-8 in stream: {e}"),
            source: None,
        })?;
        self.buf.push_str(text);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line = self.buf[..pos].trim_end_matches('\r').to_string();
            self.buf.drain(..=pos);
            lines.push(line);
        }
        Ok(lines)
    }

    /// Whatever is left after the stream ends.
    pub(crate) fn remainder(&mut self) -> Option<String> {
        let rest = self.buf.trim().to_string();
        self.buf.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Response metadata gathered while streaming.
#[derive(Debug, Default)]
pub(crate) struct StreamMeta {
    pub id: String,
    pub model: String,
    pub created: i64,
    pub usage: Option<TokenUsage>,
}

/// Parse one SSE line into deltas.
///
/// Returns an empty vector for comments, blank lines, and the `[DONE]`
/// sentinel.
pub(crate) fn parse_sse_line(
    line: &str,
    meta: &mut StreamMeta,
) -> Result<Vec<StreamedChunk>, LlmError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(Vec::new());
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(Vec::new());
    }

    let json: serde_json::Value = serde_json::from_str(data).map_err(|e| LlmError::Unknown {
        message: format!("malformed stream chunk: {e}"),
        source: Some(Box::new(e)),
    })?;

    if let Some(id) = json["id"].as_str() {
        meta.id = id.to_string();
    }
    if let Some(model) = json["model"].as_str() {
        meta.model = model.to_string();
    }
    if let Some(created) = json["created"].as_i64() {
        meta.created = created;
    }
    if let Some(usage) = crate::mapping::parse_usage(&json["usage"]) {
        meta.usage = Some(usage);
    }

    let Some(choice) = json["choices"].as_array().and_then(|c| c.first()) else {
        return Ok(Vec::new());
    };

    let mut chunks = Vec::new();
    let delta = &choice["delta"];

    if let Some(content) = delta["content"].as_str()
        && !content.is_empty()
    {
        chunks.push(StreamedChunk::text(content));
    }

    if let Some(calls) = delta["tool_calls"].as_array() {
        for call in calls {
            let index = call["index"].as_u64().unwrap_or(0) as usize;
            chunks.push(StreamedChunk::tool_fragment(PartialToolCall {
                index,
                id: call["id"].as_str().map(str::to_string),
                name: call["function"]["name"].as_str().map(str::to_string),
                arguments_fragment: call["function"]["arguments"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            }));
        }
    }

    if let Some(reason) = choice["finish_reason"].as_str() {
        chunks.push(StreamedChunk::finish(reason));
    }

    Ok(chunks)
}
