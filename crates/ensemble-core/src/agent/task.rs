//! Unit of work dispatched to a single agent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::io::AgentInput;

/// Lifecycle of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Scheduling priority of a task.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// A task addressed to one agent.
///
/// `metadata` drives pattern selection and routing. Recognised keys:
/// `requiresConsensus`, `canParallelize`, `requiresReview`, `competitive`
/// (booleans), `specialization` (string) and `requiredCapabilities`
/// (array of strings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub agent_id: String,
    pub task_type: String,
    pub input: AgentInput,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Attempts made so far, including the one in flight.
    pub attempts: u32,
    pub max_retries: u32,
}

impl Task {
    pub fn new(
        agent_id: impl Into<String>,
        task_type: impl Into<String>,
        input: AgentInput,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            task_type: task_type.into(),
            input,
            status: TaskStatus::Pending,
            priority: TaskPriority::Normal,
            metadata: BTreeMap::new(),
            attempts: 0,
            max_retries: 0,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Read a boolean metadata flag; absent or non-boolean values are `false`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.metadata.get(key), Some(Value::Bool(true)))
    }

    /// Capabilities listed under `requiredCapabilities`, lowercased.
    pub fn required_capabilities(&self) -> Vec<String> {
        match self.metadata.get("requiredCapabilities") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_ascii_lowercase)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether another attempt is allowed after a failure.
    pub fn can_retry(&self) -> bool {
        self.attempts <= self.max_retries
    }

    /// Mark the start of an attempt.
    pub fn begin_attempt(&mut self) {
        self.attempts += 1;
        self.status = TaskStatus::Running;
    }
}
