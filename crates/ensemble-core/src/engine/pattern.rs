//! Pattern vocabulary: kinds, per-call configuration and results.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::EngineError;
use crate::agent::AgentOutput;
use crate::conflict::ResolutionStrategy;

/// The nine coordination strategies, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternKind {
    Sequential,
    Parallel,
    OrchestratorWorkers,
    Routing,
    Hierarchical,
    FeedbackLoop,
    Consensus,
    Competitive,
    CollaborativeRefinement,
}

impl PatternKind {
    pub const ALL: [PatternKind; 9] = [
        PatternKind::Sequential,
        PatternKind::Parallel,
        PatternKind::OrchestratorWorkers,
        PatternKind::Routing,
        PatternKind::Hierarchical,
        PatternKind::FeedbackLoop,
        PatternKind::Consensus,
        PatternKind::Competitive,
        PatternKind::CollaborativeRefinement,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::Sequential => "sequential",
            PatternKind::Parallel => "parallel",
            PatternKind::OrchestratorWorkers => "orchestrator-workers",
            PatternKind::Routing => "routing",
            PatternKind::Hierarchical => "hierarchical",
            PatternKind::FeedbackLoop => "feedback-loop",
            PatternKind::Consensus => "consensus",
            PatternKind::Competitive => "competitive",
            PatternKind::CollaborativeRefinement => "collaborative-refinement",
        }
    }

    /// Smallest roster the pattern accepts.
    pub fn min_agents(self) -> usize {
        match self {
            PatternKind::OrchestratorWorkers => 2,
            _ => 1,
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatternKind::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| EngineError::UnknownPattern(s.to_string()))
    }
}

/// What to do when an agent call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Re-invoke up to `max_retries` more times, then drop the agent.
    Retry,
    /// Drop the agent and carry on.
    #[default]
    Skip,
    /// Reject the whole call.
    Abort,
}

/// Fan-out width policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl OptimizationLevel {
    /// Concurrent agent calls allowed; `None` means unbounded.
    pub fn concurrency_limit(self, max_concurrency: usize) -> Option<usize> {
        match self {
            OptimizationLevel::Conservative => Some(max_concurrency.max(1)),
            OptimizationLevel::Balanced => Some(max_concurrency.max(1).saturating_mul(2)),
            OptimizationLevel::Aggressive => None,
        }
    }
}

/// Per-call pattern configuration.
///
/// Unset fields fall back to the engine's [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    /// One of the nine pattern names; parsed at execution.
    pub pattern: String,
    /// Participating agent ids, resolved against the engine roster.
    pub agents: Vec<String>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub failure_policy: Option<FailurePolicy>,
    #[serde(default)]
    pub optimization_level: OptimizationLevel,
    /// Consensus strategy override.
    #[serde(default)]
    pub strategy: Option<ResolutionStrategy>,
    /// Copied into every task the pattern dispatches; drives routing.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl PatternConfig {
    pub fn new<I, S>(pattern: impl Into<String>, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pattern: pattern.into(),
            agents: agents.into_iter().map(Into::into).collect(),
            max_iterations: None,
            timeout_ms: None,
            failure_policy: None,
            optimization_level: OptimizationLevel::default(),
            strategy: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    pub fn with_optimization_level(mut self, level: OptimizationLevel) -> Self {
        self.optimization_level = level;
        self
    }

    pub fn with_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// State of an iterative pattern (feedback-loop, collaborative-refinement).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationState {
    Running,
    Converged,
    /// The iteration bound was reached without convergence.
    Exhausted,
}

impl IterationState {
    pub fn as_str(self) -> &'static str {
        match self {
            IterationState::Running => "running",
            IterationState::Converged => "converged",
            IterationState::Exhausted => "exhausted",
        }
    }
}

/// Aggregated outcome of one pattern execution (or composition).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternResult {
    pub execution_id: Uuid,
    /// Pattern name; compositions join step names with `>`.
    pub pattern: String,
    pub output: AgentOutput,
    /// Agents that produced at least one output, in roster order.
    pub agents_used: Vec<String>,
    pub execution_time: Duration,
    pub iterations: u32,
    /// Time saved against a sequential run of the same calls, in `[0, 1]`.
    pub efficiency_gain: f64,
    pub metadata: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_names_round_trip() {
        for kind in PatternKind::ALL {
            assert_eq!(kind.as_str().parse::<PatternKind>().unwrap(), kind);
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, Value::String(kind.as_str().into()));
        }
        assert!(matches!(
            "pipeline".parse::<PatternKind>(),
            Err(EngineError::UnknownPattern(name)) if name == "pipeline"
        ));
    }

    #[test]
    fn test_concurrency_limits() {
        assert_eq!(OptimizationLevel::Conservative.concurrency_limit(4), Some(4));
        assert_eq!(OptimizationLevel::Balanced.concurrency_limit(4), Some(8));
        assert_eq!(OptimizationLevel::Aggressive.concurrency_limit(4), None);
    }

    #[test]
    fn test_pattern_config_deserializes_with_defaults() {
        let config: PatternConfig = serde_json::from_str(
            r#"{"pattern": "consensus", "agents": ["a", "b"], "failure_policy": "retry"}"#,
        )
        .unwrap();
        assert_eq!(config.pattern, "consensus");
        assert_eq!(config.failure_policy, Some(FailurePolicy::Retry));
        assert_eq!(config.optimization_level, OptimizationLevel::Balanced);
        assert!(config.max_iterations.is_none());
    }
}
