//! Error types for conflict resolution.

/// Errors produced by the [`ConflictResolver`](super::ConflictResolver).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("a conflict needs at least 2 outputs, got {count}")]
    Underspecified { count: usize },

    #[error("unknown resolution strategy: {0}")]
    UnknownStrategy(String),
}

/// Result type for conflict operations.
pub type ConflictResult<T> = std::result::Result<T, ConflictError>;
