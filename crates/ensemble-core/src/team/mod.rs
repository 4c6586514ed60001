//! Agent roster and team composition.
//!
//! # Module layout
//!
//! - [`specialization`] — `Specialization` and keyword classification
//! - [`manager`] — `AgentTeamManager`, `Team`, `TeamSizeBounds`, `TeamStats`
//! - [`error`] — `TeamError`, `TeamResult`

pub mod error;
pub mod manager;
pub mod specialization;

pub use error::{TeamError, TeamResult};
pub use manager::{AgentTeamManager, Team, TeamSizeBounds, TeamStats};
pub use specialization::Specialization;
