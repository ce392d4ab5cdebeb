//! Agent AI Brain
//!
//! An HTTP service that answers energy-domain questions through a chain of
//! LLM agents:
//! - an input guardrail that can refuse a message outright
//! - a rewriter and an intent classifier that route the message
//! - tool agents for user manuals, device alarms and general energy questions
//! - two-tier memory: recent turns per session, and every message embedded
//!   for similarity recall
//!
//! PIPELINE:
//! GUARDRAIL → REMEMBER → REWRITE → SEARCH → CLASSIFY → TOOL → REMEMBER

pub mod agent;
pub mod api;
pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod intent;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod models;
pub mod pipeline;
pub mod tools;

#[cfg(test)]
mod testing;

pub use error::{BrainError, Result};

// Re-export common types
pub use intent::Intent;
pub use models::*;
pub use pipeline::Brain;
