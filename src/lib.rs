//! Courier - conversational-agent orchestration core
//!
//! Given a conversation history and a new user message, Courier drives a
//! Gemini backend through the multi-turn tool-calling protocol until the
//! model produces a final answer, while maintaining a server-side context
//! cache for the (large, static) system instruction.

pub mod agent;
pub mod config;
pub mod error;
pub mod storage;
pub mod tools;

pub use error::{Error, Result};
