//! Token counting through a pluggable tokenizer.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::RwLock;

use vellum_types::Message;

/// A tokenizer the counter delegates to.
///
/// Real tokenizers (tiktoken, sentencepiece bindings) are adapters
/// implemented by the caller; [`HeuristicTokenizer`] is the built-in
/// default.
pub trait Tokenizer: Send + Sync {
    /// Encode text into token ids.
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Count tokens in text. Defaults to `encode(text).len()`.
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// Chars-per-token estimator (default 4 chars/token, ceiling).
///
/// Good enough for budgeting; do not use where exact counts matter.
#[derive(Debug, Clone)]
pub struct HeuristicTokenizer {
    chars_per_token: usize,
}

impl HeuristicTokenizer {
    /// Create with the default ratio of 4 chars per token.
    #[must_use]
    pub fn new() -> Self {
        Self { chars_per_token: 4 }
    }

    /// Create with a custom chars-per-token ratio (minimum 1).
    #[must_use]
    pub fn with_ratio(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for HeuristicTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for HeuristicTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        // Synthetic ids; only the count is meaningful for this tokenizer.
        (0..self.count(text) as u32).collect()
    }

    fn count(&self, text: &str) -> usize {
        text.len().div_ceil(self.chars_per_token)
    }
}

/// Per-message overhead added for role markers and formatting.
pub const PER_MESSAGE_OVERHEAD: usize = 4;
/// Per-conversation overhead added once.
pub const PER_CONVERSATION_OVERHEAD: usize = 10;

/// Counts tokens for messages and conversations.
///
/// Adds a fixed overhead per message and per conversation on top of the
/// tokenizer's counts. For assistant messages carrying tool calls, the
/// serialized JSON of each call's arguments is counted too. Counts are
/// memoized by message identity, so repeated budgeting passes over a
/// mostly-unchanged conversation stay cheap.
pub struct ConversationTokenCounter<T: Tokenizer> {
    tokenizer: T,
    per_message_overhead: usize,
    per_conversation_overhead: usize,
    cache: RwLock<HashMap<u64, usize>>,
}

impl<T: Tokenizer> ConversationTokenCounter<T> {
    /// Create a counter with the default overheads (4/message,
    /// 10/conversation).
    #[must_use]
    pub fn new(tokenizer: T) -> Self {
        Self {
            tokenizer,
            per_message_overhead: PER_MESSAGE_OVERHEAD,
            per_conversation_overhead: PER_CONVERSATION_OVERHEAD,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Override the overhead constants.
    #[must_use]
    pub fn with_overheads(mut self, per_message: usize, per_conversation: usize) -> Self {
        self.per_message_overhead = per_message;
        self.per_conversation_overhead = per_conversation;
        self
    }

    /// Count tokens in a single message, including tool-call arguments.
    pub fn count_message(&self, message: &Message) -> usize {
        let key = message_key(message);
        if let Ok(cache) = self.cache.read()
            && let Some(cached) = cache.get(&key)
        {
            return *cached;
        }

        let mut tokens = self.tokenizer.count(message.content());
        for call in message.tool_calls() {
            tokens += self.tokenizer.count(&call.name);
            tokens += self.tokenizer.count(&call.arguments.to_string());
        }
        tokens += self.per_message_overhead;

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, tokens);
        }
        tokens
    }

    /// Count tokens across a slice of messages, plus the conversation
    /// overhead.
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| self.count_message(m))
            .sum::<usize>()
            + self.per_conversation_overhead
    }

    /// Count raw text through the underlying tokenizer (no overheads).
    pub fn count_text(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }
}

/// Identity hash of a message used as the memoization key.
fn message_key(message: &Message) -> u64 {
    let mut hasher = DefaultHasher::new();
    message.role().hash(&mut hasher);
    message.content().hash(&mut hasher);
    for call in message.tool_calls() {
        call.id.hash(&mut hasher);
        call.name.hash(&mut hasher);
        call.arguments.to_string().hash(&mut hasher);
    }
    hasher.finish()
}
