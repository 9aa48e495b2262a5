//! Conversation orchestration for AI bot personas.
//!
//! The [`orchestrator::Orchestrator`] turns an outgoing user message into a
//! persisted, context-aware, personality-modulated bot reply. Everything it
//! talks to sits behind a trait: [`store::ChatStore`] for records,
//! [`store::LocalCache`] for the last-known mirror, and
//! [`agent::providers::LlmProvider`] for completions.

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod fs_util;
pub mod memory;
pub mod mood;
pub mod orchestrator;
pub mod personality;
pub mod prompt;
pub mod secrets;
pub mod store;
pub mod types;
