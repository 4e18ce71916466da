#![deny(missing_docs)]
//! Core types for the vellum LLM toolkit.
//!
//! Defines the conversation model ([`Message`], [`Conversation`],
//! [`ToolCall`]), the completion contract ([`Completion`],
//! [`CompletionOptions`], [`StreamedChunk`]), the shared error taxonomy
//! ([`LlmError`]), and the [`ProviderClient`] trait that every backend
//! implements. Provider crates, the agent loop, and the RAG layer all
//! speak these types.

pub mod completion;
pub mod error;
pub mod message;
pub mod metrics;
pub mod provider;
pub mod stream;

pub use completion::*;
pub use error::*;
pub use message::*;
pub use metrics::*;
pub use provider::*;
pub use stream::*;
