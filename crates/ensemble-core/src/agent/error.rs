//! Error types reported by agents.

/// Errors an agent invocation can produce.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("agent {agent_id} failed: {reason}")]
    ExecutionFailed { agent_id: String, reason: String },

    #[error("agent {agent_id} timed out after {timeout_ms}ms")]
    Timeout { agent_id: String, timeout_ms: u64 },

    #[error("agent {agent_id} is unavailable")]
    Unavailable { agent_id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl AgentError {
    /// Shorthand for [`AgentError::ExecutionFailed`].
    pub fn failed(agent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            agent_id: agent_id.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for agent operations.
pub type AgentResult<T> = std::result::Result<T, AgentError>;
