//! Budget enforcement by pruning whole semantic blocks.

use tracing::debug;
use vellum_types::{ContextError, Message};

use crate::blocks::{BlockType, SemanticBlock, flatten_blocks, group_into_semantic_blocks};
use crate::compressor::HistoryCompressor;
use crate::counter::{ConversationTokenCounter, Tokenizer};

/// Which blocks pruning may remove, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneStrategy {
    /// Remove the oldest block of any type. Pinned digests go last.
    OldestFirst,
    /// Remove only whole user/assistant pairs, oldest first.
    OldestPair,
}

/// Prune whole blocks until the conversation fits
/// `budget - reserve_completion` tokens.
///
/// # Errors
///
/// - [`ContextError::EmptyResult`] when fitting the budget would require
///   removing every message;
/// - [`ContextError::TokenBudgetExceeded`] when no prunable block
///   remains (or the reserve alone exceeds the budget) and the
///   conversation is still too large.
pub fn enforce_budget<T: Tokenizer>(
    messages: &[Message],
    counter: &ConversationTokenCounter<T>,
    budget: usize,
    reserve_completion: usize,
    strategy: PruneStrategy,
) -> Result<Vec<Message>, ContextError> {
    let Some(target) = budget.checked_sub(reserve_completion) else {
        return Err(ContextError::TokenBudgetExceeded {
            needed: reserve_completion,
            budget,
        });
    };

    let mut blocks = group_into_semantic_blocks(messages)?;

    loop {
        let flat = flatten_blocks(&blocks);
        let total = counter.count_messages(&flat);
        if total <= target {
            return Ok(flat);
        }

        let Some(victim) = pick_victim(&blocks, strategy) else {
            return Err(ContextError::TokenBudgetExceeded {
                needed: total,
                budget: target,
            });
        };

        if blocks.len() == 1 {
            return Err(ContextError::EmptyResult);
        }

        debug!(victim, total, target, "pruning semantic block");
        blocks.remove(victim);
    }
}

/// Index of the next block to prune, or `None` when nothing is prunable.
fn pick_victim(blocks: &[SemanticBlock], strategy: PruneStrategy) -> Option<usize> {
    match strategy {
        PruneStrategy::OldestFirst => blocks
            .iter()
            .position(|b| !b.is_pinned_digest())
            .or_else(|| (!blocks.is_empty()).then_some(0)),
        PruneStrategy::OldestPair => blocks
            .iter()
            .position(|b| b.block_type == BlockType::UserAssistantPair),
    }
}

/// Compress-then-prune pipeline.
///
/// After it runs, either `total_tokens ≤ budget - reserve_completion`
/// holds, or the pipeline has returned an error.
pub struct ContextPipeline {
    /// Token cap handed to the compressor.
    pub cap_tokens: usize,
    /// Blocks kept verbatim by the compressor.
    pub keep_last_k: usize,
    /// Pruning strategy applied after compression.
    pub strategy: PruneStrategy,
}

impl ContextPipeline {
    /// Create a pipeline.
    #[must_use]
    pub fn new(cap_tokens: usize, keep_last_k: usize, strategy: PruneStrategy) -> Self {
        Self {
            cap_tokens,
            keep_last_k,
            strategy,
        }
    }

    /// Compress history, then prune to the budget.
    ///
    /// # Errors
    ///
    /// Propagates compressor and pruning errors; see [`enforce_budget`].
    pub fn apply<T: Tokenizer>(
        &self,
        messages: &[Message],
        counter: &ConversationTokenCounter<T>,
        budget: usize,
        reserve_completion: usize,
    ) -> Result<Vec<Message>, ContextError> {
        let compressor = HistoryCompressor::new();
        let compressed =
            compressor.compress_to_digest(messages, counter, self.cap_tokens, self.keep_last_k)?;
        enforce_budget(&compressed, counter, budget, reserve_completion, self.strategy)
    }
}
