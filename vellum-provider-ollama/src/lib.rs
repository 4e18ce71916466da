#![deny(missing_docs)]
//! Ollama chat provider for vellum.
//!
//! Ollama speaks plain JSON over `/api/chat` and streams newline-
//! delimited JSON rather than SSE. Two dialect quirks this crate owns:
//! assistant `content` is always a plain string (empty, never null),
//! and tool calls carry no ids, so the client synthesizes `ollama_{n}`
//! ids to keep the conversation invariant intact.

pub mod client;
pub mod mapping;
pub mod streaming;

pub use client::Ollama;
