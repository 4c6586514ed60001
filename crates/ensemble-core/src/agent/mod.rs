//! Agent capability contract.
//!
//! Concrete agents (model-backed, tool-backed, mocks) live outside this crate
//! and are reached only through the [`Agent`] trait.
//!
//! # Module layout
//!
//! - [`traits`] — `Agent`, `AgentStatus`, `HealthReport`, `AgentAnalytics`
//! - [`io`] — `AgentInput`, `AgentOutput`
//! - [`task`] — `Task`, `TaskStatus`, `TaskPriority`
//! - [`error`] — `AgentError`, `AgentResult`

pub mod error;
pub mod io;
pub mod task;
pub mod traits;

pub use error::{AgentError, AgentResult};
pub use io::{AgentInput, AgentOutput};
pub use task::{Task, TaskPriority, TaskStatus};
pub use traits::{Agent, AgentAnalytics, AgentHandle, AgentStatus, HealthReport};
