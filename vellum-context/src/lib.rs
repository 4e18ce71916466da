#![deny(missing_docs)]
//! Token counting and context-window management.
//!
//! Three layers, used together by the agent loop but usable on their own:
//!
//! - [`ConversationTokenCounter`] counts tokens per message and per
//!   conversation through a pluggable [`Tokenizer`];
//! - [`group_into_semantic_blocks`] splits a conversation into the
//!   minimal units ([`SemanticBlock`]) the compressor treats atomically;
//! - [`HistoryCompressor`] digests old blocks into a pinned
//!   `[HISTORY_SUMMARY]` system message, and [`enforce_budget`] prunes
//!   whole blocks until the conversation fits a token budget.

pub mod blocks;
pub mod compressor;
pub mod counter;
pub mod pruning;

pub use blocks::{BlockType, SemanticBlock, group_into_semantic_blocks};
pub use compressor::{DIGEST_PREFIX, HistoryCompressor};
pub use counter::{ConversationTokenCounter, HeuristicTokenizer, Tokenizer};
pub use pruning::{ContextPipeline, PruneStrategy, enforce_budget};
