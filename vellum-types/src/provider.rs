//! The [`ProviderClient`] trait and the retry policy shared by provider
//! implementations.

use std::time::Duration;

use async_trait::async_trait;

use crate::completion::{Completion, CompletionOptions};
use crate::error::{LlmError, Result};
use crate::message::Conversation;
use crate::stream::StreamedChunk;

/// Callback receiving streamed deltas, invoked in wire-arrival order on a
/// single logical task.
pub type ChunkSink<'a> = dyn FnMut(StreamedChunk) + Send + 'a;

/// A client for one LLM backend.
///
/// Implementations translate the [`Conversation`] to the provider's wire
/// dialect, map errors into the shared taxonomy, and retry recoverable
/// failures with the configured [`RetryPolicy`]. Clients are cheap to
/// clone internally (shared HTTP pool) and safe to call concurrently.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Short provider name used in metrics and error context
    /// (`"openai"`, `"anthropic"`, ...).
    fn name(&self) -> &str;

    /// Request a completion and wait for the full response.
    async fn complete(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
    ) -> Result<Completion>;

    /// Request a streaming completion.
    ///
    /// `on_chunk` is invoked for every delta in arrival order. The
    /// returned completion equals the fold of the emitted chunks.
    async fn stream_complete(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
        on_chunk: &mut ChunkSink<'_>,
    ) -> Result<Completion>;

    /// Total context window of the configured model, in tokens.
    fn context_window(&self) -> usize;

    /// Tokens reserved for the completion when budgeting the prompt.
    fn reserve_completion(&self) -> usize;
}

impl std::fmt::Debug for dyn ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient").field("name", &self.name()).finish()
    }
}

/// Exponential backoff policy for recoverable provider errors.
///
/// Applied only at the provider-client layer, and never to a streaming
/// request once the body has started arriving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// The delay to sleep before retry number `attempt` (1-based), given
    /// the error that triggered it. A provider-supplied `retry_after`
    /// takes precedence over the computed backoff; both are capped at
    /// [`RetryPolicy::max_delay`].
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &LlmError) -> Duration {
        if let LlmError::RateLimit {
            retry_after: Some(hinted),
        } = error
        {
            return (*hinted).min(self.max_delay);
        }
        let exp = self.base_delay.saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)));
        exp.min(self.max_delay)
    }

    /// Whether another attempt should be made after `attempt` attempts
    /// failed with `error`.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &LlmError) -> bool {
        attempt < self.max_attempts && error.is_recoverable()
    }
}
