//! Reasoning Agent
//!
//! A bounded agent control loop that:
//! - Prompts a language model with the task, the tool catalogue and the run history
//! - Parses semi-structured model text into a typed proposal
//! - Applies iteration, confidence and repetition policy before any tool call
//! - Coerces positional string parameters into each tool's declared types
//! - Keeps an ordered, replayable memory of every executed step
//!
//! LOOP:
//! PROMPT → PARSE → DECIDE → DISPATCH → UPDATE MEMORY → CONTINUE?

pub mod agent;
pub mod api;
pub mod audit;
pub mod config;
pub mod decision;
pub mod error;
pub mod execution;
pub mod llm;
pub mod memory;
pub mod models;
pub mod perception;
pub mod tools;

pub use error::{AgentError, Result};

// Re-export common types
pub use agent::Agent;
pub use config::AgentConfig;
pub use memory::{MemoryEntry, MemoryState};
pub use models::*;
