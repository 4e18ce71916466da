//! Streaming chunk types and the accumulator that folds chunks into a
//! canonical [`Completion`].
//!
//! Every provider's streaming path emits [`StreamedChunk`]s in wire order
//! and assembles the final completion with [`ChunkAccumulator`], so the
//! fold of emitted chunks always equals the returned completion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::completion::{Completion, TokenUsage};
use crate::message::ToolCall;

/// A fragment of an in-progress tool call.
///
/// Providers stream tool-call arguments as string fragments keyed by the
/// call's position in the response; `id` and `name` arrive on the first
/// fragment for most providers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialToolCall {
    /// Position of the call within the response.
    pub index: usize,
    /// Call id, when already known.
    pub id: Option<String>,
    /// Tool name, when already known.
    pub name: Option<String>,
    /// Fragment of the JSON arguments string.
    pub arguments_fragment: String,
}

/// One delta from a streaming completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamedChunk {
    /// Incremental text content.
    pub content: Option<String>,
    /// Incremental tool-call fragment.
    pub tool_call: Option<PartialToolCall>,
    /// Reason the stream finished, on the final chunk.
    pub finish_reason: Option<String>,
}

impl StreamedChunk {
    /// A chunk carrying only text.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A chunk carrying a tool-call fragment.
    #[must_use]
    pub fn tool_fragment(fragment: PartialToolCall) -> Self {
        Self {
            tool_call: Some(fragment),
            ..Self::default()
        }
    }

    /// A chunk carrying only a finish reason.
    #[must_use]
    pub fn finish(reason: impl Into<String>) -> Self {
        Self {
            finish_reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// In-progress tool call being assembled from fragments.
#[derive(Debug, Default, Clone)]
struct ToolCallInProgress {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Folds a sequence of [`StreamedChunk`]s into a [`Completion`].
///
/// Content fragments are concatenated; tool-call fragments are merged by
/// index, with argument strings concatenated in arrival order. The
/// assembled completion is what streaming provider calls return, which
/// keeps the stream and the final result consistent by construction.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    content: String,
    tool_calls: BTreeMap<usize, ToolCallInProgress>,
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
}

impl ChunkAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk into the accumulated state.
    pub fn push(&mut self, chunk: &StreamedChunk) {
        if let Some(text) = &chunk.content {
            self.content.push_str(text);
        }
        if let Some(fragment) = &chunk.tool_call {
            let entry = self.tool_calls.entry(fragment.index).or_default();
            if let Some(id) = &fragment.id {
                entry.id = Some(id.clone());
            }
            if let Some(name) = &fragment.name {
                entry.name = Some(name.clone());
            }
            entry.arguments.push_str(&fragment.arguments_fragment);
        }
        if let Some(reason) = &chunk.finish_reason {
            self.finish_reason = Some(reason.clone());
        }
    }

    /// Record usage reported at the end of the stream.
    pub fn set_usage(&mut self, usage: TokenUsage) {
        self.usage = Some(usage);
    }

    /// The finish reason seen so far, if any.
    #[must_use]
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    /// Assemble the final completion.
    ///
    /// Tool calls are ordered by stream index. Argument fragments that do
    /// not parse as JSON are preserved as a JSON string rather than lost.
    #[must_use]
    pub fn into_completion(self, id: String, model: String, created: i64) -> Completion {
        let tool_calls = self
            .tool_calls
            .into_values()
            .map(|call| {
                let arguments = if call.arguments.is_empty() {
                    serde_json::Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_str(&call.arguments)
                        .unwrap_or(serde_json::Value::String(call.arguments))
                };
                ToolCall {
                    id: call.id.unwrap_or_default(),
                    name: call.name.unwrap_or_default(),
                    arguments,
                }
            })
            .collect();

        Completion {
            id,
            created,
            content: self.content,
            tool_calls,
            model,
            usage: self.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn folds_text_chunks_in_order() {
        let mut acc = ChunkAccumulator::new();
        acc.push(&StreamedChunk::text("Hello "));
        acc.push(&StreamedChunk::text("world"));
        let completion = acc.into_completion("c1".into(), "m".into(), 0);
        assert_eq!(completion.content, "Hello world");
        assert!(completion.tool_calls.is_empty());
    }

    #[test]
    fn merges_tool_fragments_by_index() {
        let mut acc = ChunkAccumulator::new();
        acc.push(&StreamedChunk::tool_fragment(PartialToolCall {
            index: 0,
            id: Some("call_1".into()),
            name: Some("get_weather".into()),
            arguments_fragment: "{\"location\":".into(),
        }));
        acc.push(&StreamedChunk::tool_fragment(PartialToolCall {
            index: 0,
            id: None,
            name: None,
            arguments_fragment: "\"Paris\"}".into(),
        }));
        let completion = acc.into_completion("c1".into(), "m".into(), 0);
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].id, "call_1");
        assert_eq!(completion.tool_calls[0].name, "get_weather");
        assert_eq!(completion.tool_calls[0].arguments, json!({"location": "Paris"}));
    }

    #[test]
    fn orders_parallel_tool_calls_by_index() {
        let mut acc = ChunkAccumulator::new();
        acc.push(&StreamedChunk::tool_fragment(PartialToolCall {
            index: 1,
            id: Some("call_b".into()),
            name: Some("second".into()),
            arguments_fragment: "{}".into(),
        }));
        acc.push(&StreamedChunk::tool_fragment(PartialToolCall {
            index: 0,
            id: Some("call_a".into()),
            name: Some("first".into()),
            arguments_fragment: "{}".into(),
        }));
        let completion = acc.into_completion("c1".into(), "m".into(), 0);
        assert_eq!(completion.tool_calls[0].id, "call_a");
        assert_eq!(completion.tool_calls[1].id, "call_b");
    }

    #[test]
    fn empty_arguments_become_empty_object() {
        let mut acc = ChunkAccumulator::new();
        acc.push(&StreamedChunk::tool_fragment(PartialToolCall {
            index: 0,
            id: Some("call_1".into()),
            name: Some("list".into()),
            arguments_fragment: String::new(),
        }));
        let completion = acc.into_completion("c1".into(), "m".into(), 0);
        assert_eq!(completion.tool_calls[0].arguments, json!({}));
    }

    #[test]
    fn malformed_arguments_preserved_as_string() {
        let mut acc = ChunkAccumulator::new();
        acc.push(&StreamedChunk::tool_fragment(PartialToolCall {
            index: 0,
            id: Some("call_1".into()),
            name: Some("f".into()),
            arguments_fragment: "{truncated".into(),
        }));
        let completion = acc.into_completion("c1".into(), "m".into(), 0);
        assert_eq!(
            completion.tool_calls[0].arguments,
            serde_json::Value::String("{truncated".into())
        );
    }

    #[test]
    fn finish_reason_and_usage_carried_through() {
        let mut acc = ChunkAccumulator::new();
        acc.push(&StreamedChunk::text("4"));
        acc.push(&StreamedChunk::finish("stop"));
        acc.set_usage(TokenUsage::new(10, 1));
        assert_eq!(acc.finish_reason(), Some("stop"));
        let completion = acc.into_completion("c1".into(), "m".into(), 0);
        assert_eq!(completion.usage, Some(TokenUsage::new(10, 1)));
    }
}
