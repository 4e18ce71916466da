#![deny(missing_docs)]
//! Google Gemini provider for vellum.
//!
//! Speaks the `generateContent` / `streamGenerateContent` API. Gemini's
//! dialect has no tool-call ids and no `tool` role: assistant calls are
//! `functionCall` parts, results go back as `functionResponse` parts in
//! user messages, and this crate synthesizes `gemini_{n}` ids to keep
//! the conversation invariant intact.

pub mod client;
pub mod mapping;
pub mod streaming;

pub use client::Gemini;
