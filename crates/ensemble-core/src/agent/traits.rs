//! The capability-polymorphic agent contract.
//!
//! The engine and team manager only ever call these methods; they never
//! construct agents. Implementors keep their own mutable status behind
//! interior mutability.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::AgentResult;
use super::io::AgentOutput;
use super::task::Task;

/// Coarse availability of an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Busy,
    Error,
    Offline,
}

impl AgentStatus {
    /// Offline agents are never dispatched to.
    pub fn is_available(self) -> bool {
        !matches!(self, AgentStatus::Offline)
    }
}

/// Snapshot returned by [`Agent::health_check`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: AgentStatus,
    pub uptime: Duration,
    pub task_count: u64,
    pub success_rate: f64,
}

/// Usage counters returned by [`Agent::analytics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentAnalytics {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub average_latency: Duration,
}

impl AgentAnalytics {
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            0.0
        } else {
            self.successful_tasks as f64 / self.total_tasks as f64
        }
    }
}

/// An autonomous executable unit.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// Declared capabilities, e.g. `"code-generation"`, `"research"`.
    fn capabilities(&self) -> &BTreeSet<String>;

    fn status(&self) -> AgentStatus;

    /// Execute one task and return its output.
    async fn execute_task(&self, task: &Task) -> AgentResult<AgentOutput>;

    async fn health_check(&self) -> AgentResult<HealthReport>;

    fn analytics(&self) -> AgentAnalytics;
}

/// Shared handle to a caller-owned agent.
pub type AgentHandle = Arc<dyn Agent>;
