//! Error types for the workflow engine.

use crate::agent::AgentError;
use crate::conflict::ConflictError;

/// Errors produced by [`AgenticWorkflowEngine`](super::AgenticWorkflowEngine).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine not initialized")]
    NotInitialized,

    #[error("unknown pattern: {0}")]
    UnknownPattern(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("pattern {pattern} was given no agents")]
    NoAgents { pattern: String },

    #[error("pattern {pattern} needs at least {required} agents, got {available}")]
    InsufficientAgents {
        pattern: String,
        required: usize,
        available: usize,
    },

    #[error("agent {agent_id} failed: {source}")]
    AgentExecutionFailure {
        agent_id: String,
        #[source]
        source: AgentError,
    },

    #[error("all agents failed in pattern {pattern}")]
    AllAgentsFailed { pattern: String },

    #[error("pattern {pattern} timed out after {timeout_ms}ms")]
    Timeout { pattern: String, timeout_ms: u64 },

    #[error("composition has no steps")]
    EmptyComposition,

    #[error("conflict resolution failed: {0}")]
    Conflict(#[from] ConflictError),
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_agent_failure_keeps_source() {
        let err = EngineError::AgentExecutionFailure {
            agent_id: "coder".into(),
            source: AgentError::failed("coder", "boom"),
        };
        assert!(err.to_string().starts_with("agent coder failed"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_conflict_error_converts() {
        let err: EngineError = ConflictError::Underspecified { count: 1 }.into();
        assert!(matches!(err, EngineError::Conflict(_)));
    }
}
