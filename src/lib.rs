#![deny(missing_docs)]
//! Umida: a Telegram companion bot backed by Google Gemini.
//!
//! The bot forwards allow-listed users' text to the Gemini `generateContent`
//! API and relays the reply back to the chat, waiting out provider rate
//! limits with a bounded cooldown retry.

/// Telegram bot implementation
pub mod bot;
/// Rate-limited completion core
pub mod completion;
/// Configuration management
pub mod config;
/// LLM provider seam and the Gemini provider
pub mod llm;
/// Text helpers shared by the transport
pub mod utils;
