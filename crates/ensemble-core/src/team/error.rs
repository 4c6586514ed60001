//! Error types for the team manager.

/// Errors produced by [`AgentTeamManager`](super::AgentTeamManager).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TeamError {
    #[error("team needs at least {required} agents, {available} registered")]
    InsufficientAgents { required: usize, available: usize },

    #[error("invalid team size bounds: min {min}, max {max}")]
    InvalidBounds { min: usize, max: usize },

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("team already exists: {0}")]
    DuplicateTeam(String),
}

/// Result type for team operations.
pub type TeamResult<T> = std::result::Result<T, TeamError>;
