#![deny(missing_docs)]
//! Anthropic Messages API provider for vellum.
//!
//! Translates the flat conversation model into Anthropic's content-block
//! dialect: system messages lift into the top-level `system` field,
//! assistant tool calls become `tool_use` blocks, and tool results
//! travel as `tool_result` blocks inside user messages.

pub mod client;
pub mod error;
pub mod mapping;
pub mod streaming;

pub use client::Anthropic;
