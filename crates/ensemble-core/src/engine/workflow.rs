//! The top-level orchestrator.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{info, instrument, warn, Instrument};
use uuid::Uuid;

use super::error::{EngineError, EngineResult};
use super::metrics::{ExecutionSample, PatternMetrics, PatternMetricsTable, PerformanceReport};
use super::pattern::{PatternConfig, PatternKind, PatternResult};
use super::patterns;
use super::run::{Run, RunSettings};
use super::Scorer;
use crate::agent::{AgentHandle, AgentInput, AgentOutput, Task, TaskPriority};
use crate::communication::InterAgentCommunication;
use crate::config::EngineConfig;
use crate::conflict::ConflictResolver;
use crate::obs;
use crate::team::{AgentTeamManager, Specialization};

/// Runs coordination patterns over a roster of agents and keeps per-pattern
/// metrics.
///
/// `initialize` must be called before any pattern runs. Collaborators are
/// optional: without a bus no coordination messages are sent, without a team
/// manager routing scores capabilities itself, and a private
/// [`ConflictResolver`] is used unless one is attached.
pub struct AgenticWorkflowEngine {
    config: EngineConfig,
    roster: RwLock<Option<Arc<Vec<AgentHandle>>>>,
    metrics: PatternMetricsTable,
    communication: Option<Arc<InterAgentCommunication>>,
    resolver: Arc<ConflictResolver>,
    team: Option<Arc<AgentTeamManager>>,
    scorer: Option<Scorer>,
}

impl Default for AgenticWorkflowEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl AgenticWorkflowEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            roster: RwLock::new(None),
            metrics: PatternMetricsTable::new(),
            communication: None,
            resolver: Arc::new(ConflictResolver::new()),
            team: None,
            scorer: None,
        }
    }

    pub fn with_communication(mut self, communication: Arc<InterAgentCommunication>) -> Self {
        self.communication = Some(communication);
        self
    }

    pub fn with_conflict_resolver(mut self, resolver: Arc<ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Route through `team`'s load-aware selection.
    pub fn with_team_manager(mut self, team: Arc<AgentTeamManager>) -> Self {
        self.team = Some(team);
        self
    }

    /// Score competitive candidates with `scorer` instead of confidence.
    pub fn with_scorer<F>(mut self, scorer: F) -> Self
    where
        F: Fn(&AgentOutput) -> f64 + Send + Sync + 'static,
    {
        self.scorer = Some(Arc::new(scorer));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn conflict_resolver(&self) -> &Arc<ConflictResolver> {
        &self.resolver
    }

    pub fn is_initialized(&self) -> bool {
        self.roster
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Install `agents` as the roster, replacing any previous one. Later
    /// duplicates of an agent id are ignored.
    #[instrument(skip(self, agents), fields(agents = agents.len()))]
    pub async fn initialize(&self, agents: Vec<AgentHandle>) {
        let mut seen = BTreeSet::new();
        let mut roster = Vec::with_capacity(agents.len());
        for agent in agents {
            if seen.insert(agent.id().to_string()) {
                roster.push(agent);
            } else {
                warn!(agent_id = %agent.id(), "duplicate agent id ignored");
            }
        }
        info!(agents = roster.len(), "workflow engine initialized");
        *self.roster.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(roster));
    }

    fn roster(&self) -> EngineResult<Arc<Vec<AgentHandle>>> {
        self.roster
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(EngineError::NotInitialized)
    }

    /// Execute one pattern and record it in that pattern's metrics.
    pub async fn execute_pattern(
        &self,
        config: &PatternConfig,
        input: AgentInput,
    ) -> EngineResult<PatternResult> {
        let roster = self.roster()?;
        let pattern: PatternKind = config.pattern.parse()?;
        let agents = resolve_agents(&roster, pattern, &config.agents)?;

        let execution_id = Uuid::new_v4();
        let span = obs::pattern_span(&execution_id.to_string(), pattern.as_str());
        self.run_pattern(execution_id, pattern, agents, config, input)
            .instrument(span)
            .await
    }

    async fn run_pattern(
        &self,
        execution_id: Uuid,
        pattern: PatternKind,
        agents: Vec<AgentHandle>,
        config: &PatternConfig,
        input: AgentInput,
    ) -> EngineResult<PatternResult> {
        let exec = execution_id.to_string();
        let settings = RunSettings::resolve(&self.config, config);
        let timeout_ms = settings.timeout_ms;
        let run = Run::new(
            exec.clone(),
            pattern,
            agents,
            settings,
            config.metadata.clone(),
            self.communication.as_deref(),
            &self.resolver,
            self.team.as_deref(),
            self.scorer.as_ref(),
        );
        obs::emit_pattern_started(&exec, pattern.as_str(), run.agents.len());

        let started = Instant::now();
        let outcome = patterns::execute(&run, input).await;
        let elapsed = started.elapsed();
        let summary = run.summary();

        let outcome = match outcome {
            Err(EngineError::AllAgentsFailed { .. }) if run.deadline_passed() => {
                Err(EngineError::Timeout {
                    pattern: pattern.to_string(),
                    timeout_ms: timeout_ms.unwrap_or_default(),
                })
            }
            other => other,
        };

        let success = outcome.is_ok();
        let efficiency_gain = if success {
            ExecutionSample::efficiency_gain(summary.baseline, elapsed)
        } else {
            0.0
        };
        self.metrics.record(
            pattern,
            &ExecutionSample {
                success,
                elapsed,
                baseline: summary.baseline,
                agents_used: summary.agents_used.len(),
                efficiency_gain,
            },
        );
        obs::emit_pattern_finished(
            &exec,
            pattern.as_str(),
            millis(elapsed),
            summary.agents_used.len(),
            outcome.as_ref().map_or(0, |o| o.iterations),
            success,
        );

        let outcome = outcome?;
        let mut metadata = outcome.metadata;
        metadata.insert("messagesSent".into(), Value::from(summary.messages_sent));
        metadata.insert("baselineMs".into(), Value::from(millis(summary.baseline)));

        Ok(PatternResult {
            execution_id,
            pattern: pattern.as_str().to_string(),
            output: outcome.output,
            agents_used: summary.agents_used,
            execution_time: elapsed,
            iterations: outcome.iterations,
            efficiency_gain,
            metadata,
        })
    }

    /// Recommend a pattern for `task` over `agents`.
    ///
    /// Rules, first match wins: `requiresConsensus` → consensus;
    /// `requiresReview` → feedback-loop; `competitive` → competitive;
    /// `canParallelize` with at least two agents → parallel when the task is
    /// high priority or the roster is small (< 4), else orchestrator-workers;
    /// three or more agents spanning several specializations → routing;
    /// otherwise sequential.
    pub fn select_optimal_pattern(
        &self,
        task: &Task,
        agents: &[AgentHandle],
    ) -> EngineResult<PatternKind> {
        self.roster()?;
        let n = agents.len();

        let choice = if task.flag("requiresConsensus") {
            PatternKind::Consensus
        } else if task.flag("requiresReview") {
            PatternKind::FeedbackLoop
        } else if task.flag("competitive") {
            PatternKind::Competitive
        } else if task.flag("canParallelize") && n >= 2 {
            if task.priority >= TaskPriority::High || n < 4 {
                PatternKind::Parallel
            } else {
                PatternKind::OrchestratorWorkers
            }
        } else if n >= 3 && distinct_specializations(agents) > 1 {
            PatternKind::Routing
        } else {
            PatternKind::Sequential
        };
        Ok(choice)
    }

    /// Run `steps` in order, piping each aggregated output into the next
    /// step's input. Every step is recorded under its own pattern.
    #[instrument(skip(self, steps, input), fields(steps = steps.len()))]
    pub async fn compose_patterns(
        &self,
        steps: &[PatternConfig],
        input: AgentInput,
    ) -> EngineResult<PatternResult> {
        let roster = self.roster()?;
        if steps.is_empty() {
            return Err(EngineError::EmptyComposition);
        }

        let mut current = input;
        let mut results: Vec<PatternResult> = Vec::with_capacity(steps.len());
        for step in steps {
            let result = self.execute_pattern(step, current.clone()).await?;
            current = AgentInput::from_output(&result.output, &current);
            results.push(result);
        }

        let mut agents_used: Vec<String> = Vec::new();
        for id in results.iter().flat_map(|r| r.agents_used.iter()) {
            if !agents_used.contains(id) {
                agents_used.push(id.clone());
            }
        }
        // Union in roster order.
        agents_used.sort_by_key(|id| roster.iter().position(|a| a.id() == id.as_str()));

        let execution_time: Duration = results.iter().map(|r| r.execution_time).sum();
        let iterations = results.iter().map(|r| r.iterations).sum();
        let efficiency_gain =
            results.iter().map(|r| r.efficiency_gain).sum::<f64>() / results.len() as f64;
        let messages_sent: u64 = results
            .iter()
            .filter_map(|r| r.metadata.get("messagesSent").and_then(Value::as_u64))
            .sum();
        let step_summaries: Vec<Value> = results
            .iter()
            .map(|r| {
                json!({
                    "pattern": r.pattern,
                    "executionId": r.execution_id,
                    "agentsUsed": r.agents_used,
                    "iterations": r.iterations,
                    "efficiencyGain": r.efficiency_gain,
                })
            })
            .collect();

        let pattern = results
            .iter()
            .map(|r| r.pattern.as_str())
            .collect::<Vec<_>>()
            .join(">");
        let output = results
            .pop()
            .map(|r| r.output)
            .ok_or(EngineError::EmptyComposition)?;

        let mut metadata = BTreeMap::new();
        metadata.insert("steps".to_string(), Value::from(step_summaries));
        metadata.insert("messagesSent".to_string(), Value::from(messages_sent));

        Ok(PatternResult {
            execution_id: Uuid::new_v4(),
            pattern,
            output,
            agents_used,
            execution_time,
            iterations,
            efficiency_gain,
            metadata,
        })
    }

    /// Metrics for `pattern`; `None` before its first execution.
    pub fn pattern_metrics(&self, pattern: PatternKind) -> Option<PatternMetrics> {
        self.metrics.get(pattern)
    }

    /// Accrued value over coordination cost for `pattern`; `0.0` before any
    /// execution.
    pub fn calculate_roi(&self, pattern: PatternKind) -> f64 {
        self.metrics.roi(pattern)
    }

    pub fn performance_report(&self) -> PerformanceReport {
        self.metrics.report()
    }

    /// Release the roster. Metrics are kept and flushed to the log.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let previous = self
            .roster
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if previous.is_some() {
            self.metrics.flush();
            info!("workflow engine shut down");
        }
    }
}

fn resolve_agents(
    roster: &[AgentHandle],
    pattern: PatternKind,
    ids: &[String],
) -> EngineResult<Vec<AgentHandle>> {
    if ids.is_empty() {
        return Err(EngineError::NoAgents {
            pattern: pattern.to_string(),
        });
    }
    let agents = ids
        .iter()
        .map(|id| {
            roster
                .iter()
                .find(|a| a.id() == id.as_str())
                .cloned()
                .ok_or_else(|| EngineError::UnknownAgent(id.clone()))
        })
        .collect::<EngineResult<Vec<_>>>()?;
    if agents.len() < pattern.min_agents() {
        return Err(EngineError::InsufficientAgents {
            pattern: pattern.to_string(),
            required: pattern.min_agents(),
            available: agents.len(),
        });
    }
    Ok(agents)
}

fn distinct_specializations(agents: &[AgentHandle]) -> usize {
    agents
        .iter()
        .map(|a| Specialization::infer(a.capabilities()))
        .collect::<BTreeSet<_>>()
        .len()
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MockAgent;

    fn roster(n: usize) -> Vec<AgentHandle> {
        (0..n)
            .map(|i| MockAgent::new(format!("agent-{i}")).into_handle())
            .collect()
    }

    #[tokio::test]
    async fn test_execute_before_initialize_fails() {
        let engine = AgenticWorkflowEngine::default();
        let err = engine
            .execute_pattern(&PatternConfig::new("sequential", ["a"]), AgentInput::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotInitialized));
    }

    #[tokio::test]
    async fn test_agent_resolution_errors() {
        let engine = AgenticWorkflowEngine::default();
        engine.initialize(roster(2)).await;

        let err = engine
            .execute_pattern(
                &PatternConfig::new("sequential", Vec::<String>::new()),
                AgentInput::new("x"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoAgents { .. }));

        let err = engine
            .execute_pattern(&PatternConfig::new("parallel", ["ghost"]), AgentInput::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownAgent(id) if id == "ghost"));

        let err = engine
            .execute_pattern(
                &PatternConfig::new("orchestrator-workers", ["agent-0"]),
                AgentInput::new("x"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientAgents { required: 2, available: 1, .. }
        ));
        // structural errors are rejected before dispatch and not recorded
        assert!(engine.pattern_metrics(PatternKind::OrchestratorWorkers).is_none());
    }

    #[tokio::test]
    async fn test_initialize_ignores_duplicate_ids() {
        let engine = AgenticWorkflowEngine::default();
        let mut agents = roster(2);
        agents.push(MockAgent::new("agent-0").into_handle());
        engine.initialize(agents).await;
        assert_eq!(engine.roster().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let engine = AgenticWorkflowEngine::default();
        engine.initialize(roster(1)).await;
        engine.shutdown().await;
        engine.shutdown().await;
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_distinct_specializations() {
        let agents = vec![
            MockAgent::new("a").with_capabilities(["coding"]).into_handle(),
            MockAgent::new("b").with_capabilities(["code-generation"]).into_handle(),
            MockAgent::new("c").with_capabilities(["writing"]).into_handle(),
        ];
        assert_eq!(distinct_specializations(&agents), 2);
    }
}
