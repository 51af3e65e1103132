//! Error types for the reasoning agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    // =============================
    // Control Loop Errors
    // =============================

    /// Model output could not be turned into a proposal
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Policy rejection: {0}")]
    PolicyRejection(String),

    #[error("Tool invocation error: {0}")]
    ToolInvocation(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audit error: {0}")]
    Audit(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Failures that only cost the current tick; the loop may ask the model again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AgentError::Parse(_) | AgentError::Timeout(_) | AgentError::Llm(_))
    }
}
