//! Error types for the communication layer.

/// Errors produced by [`InterAgentCommunication`](super::InterAgentCommunication).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommError {
    #[error("communication layer is not initialized")]
    NotInitialized,

    #[error("no subscriber registered for agent {0}")]
    NoSubscriber(String),
}

/// Result type for communication operations.
pub type CommResult<T> = std::result::Result<T, CommError>;
