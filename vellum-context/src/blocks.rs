//! Grouping a conversation into semantic blocks.
//!
//! A semantic block is the smallest unit the compressor may summarize or
//! prune as a whole: a user/assistant exchange with its tool traffic, a
//! standalone assistant message, stray tool results, or a system message.

use vellum_types::{ContextError, Message};

use crate::compressor::DIGEST_PREFIX;

/// The shape of a semantic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// A user message and the assistant response that answers it
    /// (with any tool calls/results in between).
    UserAssistantPair,
    /// An assistant message with no user message opening it.
    StandaloneAssistant,
    /// Tool results with no block to attach to.
    StandaloneTool,
    /// A system message. Digest blocks (content starting with
    /// `[HISTORY_SUMMARY]`) are pinned: never compressed or reordered.
    System,
}

/// A minimal compressible unit of conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticBlock {
    /// The messages in this block, in conversation order.
    pub messages: Vec<Message>,
    /// The shape of the block.
    pub block_type: BlockType,
    /// Whether the block is a pair still waiting for its assistant
    /// response.
    pub expecting_assistant_response: bool,
}

impl SemanticBlock {
    /// Whether this is a pinned history digest that must never be
    /// compressed or reordered.
    #[must_use]
    pub fn is_pinned_digest(&self) -> bool {
        self.block_type == BlockType::System
            && self
                .messages
                .first()
                .is_some_and(|m| m.content().starts_with(DIGEST_PREFIX))
    }

    fn new(block_type: BlockType, message: Message, expecting: bool) -> Self {
        Self {
            messages: vec![message],
            block_type,
            expecting_assistant_response: expecting,
        }
    }
}

/// Group messages into semantic blocks.
///
/// Rules:
/// - a `User` message starts a new pair expecting an assistant response;
///   the next `Assistant` closes it;
/// - an `Assistant` with no open pair becomes a standalone block;
/// - `Tool` messages attach to the current block, or form a standalone
///   tool block when none is open;
/// - `System` messages always form their own block.
///
/// # Errors
///
/// Returns [`ContextError::SemanticBlockingFailed`] when the input is
/// empty.
pub fn group_into_semantic_blocks(
    messages: &[Message],
) -> Result<Vec<SemanticBlock>, ContextError> {
    if messages.is_empty() {
        return Err(ContextError::SemanticBlockingFailed(
            "no messages to group".into(),
        ));
    }

    let mut blocks: Vec<SemanticBlock> = Vec::new();
    // Index into `blocks` of the block that tool results and assistant
    // responses may still attach to.
    let mut current: Option<usize> = None;

    for msg in messages {
        match msg {
            Message::System { .. } => {
                blocks.push(SemanticBlock::new(BlockType::System, msg.clone(), false));
                current = None;
            }
            Message::User { .. } => {
                blocks.push(SemanticBlock::new(
                    BlockType::UserAssistantPair,
                    msg.clone(),
                    true,
                ));
                current = Some(blocks.len() - 1);
            }
            Message::Assistant { .. } => match current {
                Some(idx) if blocks[idx].block_type == BlockType::UserAssistantPair => {
                    blocks[idx].messages.push(msg.clone());
                    blocks[idx].expecting_assistant_response = false;
                }
                _ => {
                    blocks.push(SemanticBlock::new(
                        BlockType::StandaloneAssistant,
                        msg.clone(),
                        false,
                    ));
                    current = Some(blocks.len() - 1);
                }
            },
            Message::Tool { .. } => match current {
                Some(idx) => blocks[idx].messages.push(msg.clone()),
                None => {
                    blocks.push(SemanticBlock::new(
                        BlockType::StandaloneTool,
                        msg.clone(),
                        false,
                    ));
                    current = Some(blocks.len() - 1);
                }
            },
        }
    }

    Ok(blocks)
}

/// Flatten blocks back into a message list, preserving block order.
#[must_use]
pub fn flatten_blocks(blocks: &[SemanticBlock]) -> Vec<Message> {
    blocks
        .iter()
        .flat_map(|b| b.messages.iter().cloned())
        .collect()
}
