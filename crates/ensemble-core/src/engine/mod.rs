//! Pattern-execution engine.
//!
//! # Module layout
//!
//! - [`workflow`] — `AgenticWorkflowEngine`
//! - [`pattern`] — `PatternKind`, `PatternConfig`, `PatternResult`, policies
//! - [`metrics`] — `PatternMetrics`, `PatternMetricsTable`, `PerformanceReport`
//! - [`error`] — `EngineError`, `EngineResult`
//!
//! The nine algorithms live in the private `patterns` module and share the
//! per-call context in `run`.

use std::sync::Arc;

use crate::agent::AgentOutput;

pub mod error;
pub mod metrics;
pub mod pattern;
mod patterns;
mod run;
pub mod workflow;

pub use error::{EngineError, EngineResult};
pub use metrics::{ExecutionSample, PatternMetrics, PatternMetricsTable, PerformanceReport};
pub use pattern::{
    FailurePolicy, IterationState, OptimizationLevel, PatternConfig, PatternKind, PatternResult,
};
pub use run::ENGINE_AGENT_ID;
pub use workflow::AgenticWorkflowEngine;

/// Scores a competitive candidate; higher wins.
pub type Scorer = Arc<dyn Fn(&AgentOutput) -> f64 + Send + Sync>;
