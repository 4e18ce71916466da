//! History compression: digest old blocks into a pinned system message.

use regex::Regex;
use tracing::debug;
use vellum_types::{ContextError, Message};

use crate::blocks::{SemanticBlock, flatten_blocks, group_into_semantic_blocks};
use crate::counter::{ConversationTokenCounter, Tokenizer};

/// Prefix marking a history digest. Digest messages are pinned: the
/// compressor reuses them verbatim and never re-summarizes them.
pub const DIGEST_PREFIX: &str = "[HISTORY_SUMMARY]";

/// Compresses old conversation history into `[HISTORY_SUMMARY]` digests.
///
/// The last `keep_last_k` semantic blocks stay verbatim; everything
/// older is folded into a single digest that preserves identifiers,
/// URLs, error sentences, and decision sentences from the original text.
/// Compression is idempotent: an existing digest is reused, not
/// re-summarized, so running the compressor on its own output is a
/// no-op.
pub struct HistoryCompressor {
    identifier_re: Regex,
    url_re: Regex,
    error_re: Regex,
    decision_re: Regex,
    sentence_re: Regex,
}

impl HistoryCompressor {
    /// Create a compressor with the standard extraction patterns.
    #[must_use]
    pub fn new() -> Self {
        Self {
            identifier_re: Regex::new(r"[A-Z][A-Z0-9]*-[0-9]+").expect("static pattern"),
            url_re: Regex::new(r"https?://[^\s)\]]+").expect("static pattern"),
            error_re: Regex::new(r"(?i)\b(error|fail)").expect("static pattern"),
            decision_re: Regex::new(r"(?i)\b(decid|use|using)").expect("static pattern"),
            sentence_re: Regex::new(r"[^.!?\n]+[.!?]?").expect("static pattern"),
        }
    }

    /// Compress `messages` so old history becomes one digest.
    ///
    /// Keeps the last `keep_last_k` blocks verbatim. Existing digests
    /// stay at the front unchanged; non-pinned older blocks are
    /// summarized into one new digest. When the result still exceeds
    /// `cap_tokens`, the oldest two digests are merged repeatedly until
    /// the cap holds or a single digest remains.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::SemanticBlockingFailed`] for empty input.
    pub fn compress_to_digest<T: Tokenizer>(
        &self,
        messages: &[Message],
        counter: &ConversationTokenCounter<T>,
        cap_tokens: usize,
        keep_last_k: usize,
    ) -> Result<Vec<Message>, ContextError> {
        let blocks = group_into_semantic_blocks(messages)?;

        if blocks.len() <= keep_last_k {
            return Ok(messages.to_vec());
        }

        let split = blocks.len() - keep_last_k;
        let (older, kept) = blocks.split_at(split);

        let mut digests: Vec<Message> = Vec::new();
        let mut to_summarize: Vec<&SemanticBlock> = Vec::new();
        for block in older {
            if block.is_pinned_digest() {
                digests.extend(block.messages.iter().cloned());
            } else {
                to_summarize.push(block);
            }
        }

        if !to_summarize.is_empty() {
            let source: Vec<Message> = to_summarize
                .iter()
                .flat_map(|b| b.messages.iter().cloned())
                .collect();
            digests.push(Message::system(self.summarize(&source)));
        }

        let kept_messages = flatten_blocks(kept);

        // Consolidate digests while the result is over the cap.
        loop {
            let mut result: Vec<Message> = digests.clone();
            result.extend(kept_messages.iter().cloned());
            let total = counter.count_messages(&result);
            if total <= cap_tokens || digests.len() <= 1 {
                if total > cap_tokens {
                    debug!(total, cap_tokens, "digest still over cap after consolidation");
                }
                return Ok(result);
            }
            let first = digests.remove(0);
            let second = digests.remove(0);
            digests.insert(0, merge_digests(&first, &second));
        }
    }

    /// Build the digest body for a stretch of messages.
    fn summarize(&self, messages: &[Message]) -> String {
        let text: String = messages
            .iter()
            .map(|m| m.content())
            .collect::<Vec<_>>()
            .join("\n");

        let identifiers = dedup(
            self.identifier_re
                .find_iter(&text)
                .map(|m| m.as_str().to_string()),
        );
        let urls = dedup(self.url_re.find_iter(&text).map(|m| m.as_str().to_string()));

        let mut errors = Vec::new();
        let mut decisions = Vec::new();
        for sentence in self.sentence_re.find_iter(&text) {
            let s = sentence.as_str().trim();
            if s.is_empty() {
                continue;
            }
            if self.error_re.is_match(s) {
                errors.push(s.to_string());
            }
            if self.decision_re.is_match(s) {
                decisions.push(s.to_string());
            }
        }
        let errors = dedup(errors.into_iter());
        let decisions = dedup(decisions.into_iter());

        let mut sections = Vec::new();
        if !identifiers.is_empty() {
            sections.push(format!("ids: {}", identifiers.join(", ")));
        }
        if !urls.is_empty() {
            sections.push(format!("urls: {}", urls.join(", ")));
        }
        if !errors.is_empty() {
            sections.push(format!("errors: {}", errors.join(" | ")));
        }
        if !decisions.is_empty() {
            sections.push(format!("decisions: {}", decisions.join(" | ")));
        }
        if sections.is_empty() {
            sections.push(format!("{} earlier messages", messages.len()));
        }

        format!("{DIGEST_PREFIX} {}", sections.join("; "))
    }
}

impl Default for HistoryCompressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge two digest messages into one, oldest first.
fn merge_digests(first: &Message, second: &Message) -> Message {
    let strip = |m: &Message| {
        m.content()
            .strip_prefix(DIGEST_PREFIX)
            .unwrap_or(m.content())
            .trim()
            .to_string()
    };
    Message::system(format!("{DIGEST_PREFIX} {}; {}", strip(first), strip(second)))
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}
