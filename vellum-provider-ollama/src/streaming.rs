//! NDJSON streaming for the Ollama chat API.
//!
//! One JSON object per line; the final object has `"done": true` and
//! carries the token counts:
//!
//! ```text
//! {"model":"llama3.2","message":{"role":"assistant","content":"Hel"},"done":false}
//! {"model":"llama3.2","message":{"role":"assistant","content":"lo"},"done":false}
//! {"model":"llama3.2","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop","eval_count":10,"prompt_eval_count":20}
//! ```

use vellum_types::{LlmError, PartialToolCall, StreamedChunk, TokenUsage};

use crate::mapping::parse_usage;

/// Parser state carried across NDJSON lines.
#[derive(Debug, Default)]
pub(crate) struct NdjsonState {
    /// Model reported by the stream.
    pub model: String,
    /// Usage from the final object.
    pub usage: Option<TokenUsage>,
    /// Next synthesized tool-call index.
    tool_index: usize,
}

impl NdjsonState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Parse one NDJSON line into deltas.
    pub(crate) fn process_line(&mut self, line: &str) -> Result<Vec<StreamedChunk>, LlmError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Vec::new());
        }

        let json: serde_json::Value = serde_json::from_str(line).map_err(|e| LlmError::Unknown {
            message: format!("malformed stream line: {e}"),
            source: Some(Box::new(e)),
        })?;

        if let Some(model) = json["model"].as_str() {
            self.model = model.to_string();
        }

        let mut chunks = Vec::new();
        let message = &json["message"];

        if let Some(content) = message["content"].as_str()
            && !content.is_empty()
        {
            chunks.push(StreamedChunk::text(content));
        }

        if let Some(calls) = message["tool_calls"].as_array() {
            for call in calls {
                let index = self.tool_index;
                self.tool_index += 1;
                chunks.push(StreamedChunk::tool_fragment(PartialToolCall {
                    index,
                    id: Some(format!("ollama_{index}")),
                    name: call["function"]["name"].as_str().map(str::to_string),
                    arguments_fragment: call["function"]["arguments"].to_string(),
                }));
            }
        }

        if json["done"].as_bool() == Some(true) {
            if let Some(usage) = parse_usage(&json) {
                self.usage = Some(usage);
            }
            if let Some(reason) = json["done_reason"].as_str() {
                chunks.push(StreamedChunk::finish(reason));
            }
        }

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_types::ChunkAccumulator;

    #[test]
    fn content_lines_fold_into_completion() {
        let mut state = NdjsonState::new();
        let mut acc = ChunkAccumulator::new();
        let lines = [
            r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hel"},"done":false}"#,
            r#"{"model":"llama3.2","message":{"role":"assistant","content":"lo"},"done":false}"#,
            r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop","eval_count":10,"prompt_eval_count":20}"#,
        ];
        for line in lines {
            for chunk in state.process_line(line).unwrap() {
                acc.push(&chunk);
            }
        }
        assert_eq!(acc.finish_reason(), Some("stop"));
        if let Some(usage) = state.usage {
            acc.set_usage(usage);
        }
        let completion = acc.into_completion("ollama-1".into(), state.model, 0);
        assert_eq!(completion.content, "Hello");
        assert_eq!(completion.model, "llama3.2");
        assert_eq!(completion.usage.unwrap().total_tokens, 30);
    }

    #[test]
    fn streamed_tool_calls_get_sequential_ids() {
        let mut state = NdjsonState::new();
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"a","arguments":{}}},{"function":{"name":"b","arguments":{"x":1}}}]},"done":false}"#;
        let chunks = state.process_line(line).unwrap();
        assert_eq!(chunks.len(), 2);
        let first = chunks[0].tool_call.as_ref().unwrap();
        let second = chunks[1].tool_call.as_ref().unwrap();
        assert_eq!(first.id.as_deref(), Some("ollama_0"));
        assert_eq!(second.id.as_deref(), Some("ollama_1"));
        assert_eq!(second.arguments_fragment, r#"{"x":1}"#);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut state = NdjsonState::new();
        assert!(state.process_line("").unwrap().is_empty());
        assert!(state.process_line("   ").unwrap().is_empty());
    }

    #[test]
    fn malformed_line_is_an_error() {
        let mut state = NdjsonState::new();
        assert!(state.process_line("{nope").is_err());
    }
}
