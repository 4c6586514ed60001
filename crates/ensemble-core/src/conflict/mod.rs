//! Arbitration of disagreeing agent outputs.
//!
//! # Module layout
//!
//! - [`types`] — `ConflictEntry`, `Conflict`, `ResolutionStrategy`, `Resolution`
//! - [`resolver`] — `ConflictResolver`, `ConflictStats`
//! - [`error`] — `ConflictError`, `ConflictResult`

pub mod error;
pub mod resolver;
pub mod types;

pub use error::{ConflictError, ConflictResult};
pub use resolver::{ConflictResolver, ConflictStats, RESOLVER_AGENT_ID};
pub use types::{Conflict, ConflictEntry, Resolution, ResolutionStrategy};
