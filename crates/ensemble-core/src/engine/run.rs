//! Per-call execution context shared by every pattern algorithm.
//!
//! A [`Run`] owns the resolved roster, the effective settings and a ledger of
//! what happened (agent time spent, agents that produced output, messages
//! sent). Pattern algorithms only talk to agents through [`Run::invoke`] and
//! [`Run::fan_out`], which apply the failure policy, the deadline and the
//! concurrency bound uniformly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::try_join_all;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::debug;

use super::error::{EngineError, EngineResult};
use super::pattern::{FailurePolicy, PatternConfig, PatternKind};
use super::Scorer;
use crate::agent::io::clamp_confidence;
use crate::agent::{AgentError, AgentHandle, AgentInput, AgentOutput, Task, TaskStatus};
use crate::communication::{InterAgentCommunication, Message, MessageType};
use crate::config::EngineConfig;
use crate::conflict::{ConflictResolver, ResolutionStrategy};
use crate::obs;
use crate::team::AgentTeamManager;

/// Sender id the engine uses for its own coordination messages.
pub const ENGINE_AGENT_ID: &str = "workflow-engine";

/// Effective settings for one call: per-call overrides applied to engine
/// defaults.
#[derive(Debug, Clone)]
pub(crate) struct RunSettings {
    pub failure_policy: FailurePolicy,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub max_iterations: u32,
    pub timeout_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub convergence_threshold: f64,
    pub inter_round_delay: Duration,
    pub hierarchy_fanout: usize,
    pub refinement_group_size: usize,
    pub strategy: ResolutionStrategy,
}

impl RunSettings {
    pub fn resolve(defaults: &EngineConfig, config: &PatternConfig) -> Self {
        Self {
            failure_policy: config
                .failure_policy
                .unwrap_or(defaults.default_failure_policy),
            max_retries: defaults.max_retries,
            retry_backoff: Duration::from_millis(defaults.retry_backoff_ms),
            // a zero bound still lets iterative patterns run once
            max_iterations: config
                .max_iterations
                .unwrap_or(defaults.default_max_iterations)
                .max(1),
            timeout_ms: config.timeout_ms.or(defaults.default_timeout_ms),
            concurrency: config
                .optimization_level
                .concurrency_limit(defaults.max_concurrency),
            convergence_threshold: defaults.convergence_threshold,
            inter_round_delay: Duration::from_millis(defaults.inter_round_delay_ms),
            hierarchy_fanout: defaults.hierarchy_fanout.max(1),
            refinement_group_size: defaults.refinement_group_size.max(1),
            strategy: config.strategy.unwrap_or(defaults.consensus_strategy),
        }
    }
}

/// What a pattern algorithm hands back to the engine.
#[derive(Debug, Clone)]
pub(crate) struct Outcome {
    pub output: AgentOutput,
    pub iterations: u32,
    pub metadata: BTreeMap<String, Value>,
}

impl Outcome {
    pub fn new(output: AgentOutput) -> Self {
        Self {
            output,
            iterations: 1,
            metadata: BTreeMap::new(),
        }
    }

    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// One agent call in a fan-out.
pub(crate) struct Job {
    pub agent: AgentHandle,
    pub stage: &'static str,
    pub input: AgentInput,
}

impl Job {
    pub fn new(agent: &AgentHandle, stage: &'static str, input: AgentInput) -> Self {
        Self {
            agent: Arc::clone(agent),
            stage,
            input,
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    agent_time: Duration,
    used: BTreeSet<usize>,
    messages_sent: u64,
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub(crate) struct RunSummary {
    pub baseline: Duration,
    pub agents_used: Vec<String>,
    pub messages_sent: u64,
}

pub(crate) struct Run<'a> {
    pub execution_id: String,
    pub pattern: PatternKind,
    pub agents: Vec<AgentHandle>,
    pub settings: RunSettings,
    pub task_metadata: BTreeMap<String, Value>,
    pub bus: Option<&'a InterAgentCommunication>,
    pub resolver: &'a ConflictResolver,
    pub team: Option<&'a AgentTeamManager>,
    pub scorer: Option<&'a Scorer>,
    deadline: Option<Instant>,
    semaphore: Option<Semaphore>,
    ledger: Mutex<Ledger>,
}

impl<'a> Run<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        execution_id: String,
        pattern: PatternKind,
        agents: Vec<AgentHandle>,
        settings: RunSettings,
        task_metadata: BTreeMap<String, Value>,
        bus: Option<&'a InterAgentCommunication>,
        resolver: &'a ConflictResolver,
        team: Option<&'a AgentTeamManager>,
        scorer: Option<&'a Scorer>,
    ) -> Self {
        let deadline = settings
            .timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let semaphore = settings.concurrency.map(Semaphore::new);
        Self {
            execution_id,
            pattern,
            agents,
            settings,
            task_metadata,
            bus,
            resolver,
            team,
            scorer,
            deadline,
            semaphore,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn all_failed(&self) -> EngineError {
        EngineError::AllAgentsFailed {
            pattern: self.pattern.to_string(),
        }
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn build_task(&self, agent: &AgentHandle, stage: &str, input: AgentInput) -> Task {
        let max_retries = match self.settings.failure_policy {
            FailurePolicy::Retry => self.settings.max_retries,
            FailurePolicy::Skip | FailurePolicy::Abort => 0,
        };
        let mut task = Task::new(agent.id(), stage, input).with_max_retries(max_retries);
        task.metadata = self.task_metadata.clone();
        task.metadata
            .insert("executionId".into(), Value::from(self.execution_id.clone()));
        task.metadata
            .insert("pattern".into(), Value::from(self.pattern.as_str()));
        task
    }

    /// Invoke `agent` once under the failure policy.
    ///
    /// Returns `Ok(None)` when the agent was dropped (skip, or retries
    /// exhausted) and `Err(AgentExecutionFailure)` under the abort policy.
    pub async fn invoke(
        &self,
        agent: &AgentHandle,
        stage: &str,
        input: AgentInput,
    ) -> EngineResult<Option<AgentOutput>> {
        let mut task = self.build_task(agent, stage, input);
        loop {
            task.begin_attempt();
            match self.attempt(agent, &task).await {
                Ok(output) => {
                    task.status = TaskStatus::Completed;
                    self.mark_used(agent.id());
                    return Ok(Some(output));
                }
                Err(err) => {
                    obs::emit_agent_failed(&self.execution_id, agent.id(), task.attempts, &err);
                    let retryable = !matches!(err, AgentError::Unavailable { .. })
                        && task.can_retry()
                        && !self.deadline_passed();
                    match self.settings.failure_policy {
                        FailurePolicy::Abort => {
                            return Err(EngineError::AgentExecutionFailure {
                                agent_id: agent.id().to_string(),
                                source: err,
                            });
                        }
                        FailurePolicy::Retry if retryable => {
                            if !self.settings.retry_backoff.is_zero() {
                                sleep(self.settings.retry_backoff).await;
                            }
                        }
                        FailurePolicy::Retry | FailurePolicy::Skip => {
                            task.status = TaskStatus::Failed;
                            debug!(
                                agent_id = %agent.id(),
                                attempts = task.attempts,
                                "agent dropped"
                            );
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }

    async fn attempt(&self, agent: &AgentHandle, task: &Task) -> Result<AgentOutput, AgentError> {
        if !agent.status().is_available() {
            return Err(AgentError::Unavailable {
                agent_id: agent.id().to_string(),
            });
        }

        let started = Instant::now();
        let result = match self.deadline {
            Some(deadline) => match timeout_at(deadline, agent.execute_task(task)).await {
                Ok(result) => result,
                Err(_) => Err(AgentError::Timeout {
                    agent_id: agent.id().to_string(),
                    timeout_ms: self.settings.timeout_ms.unwrap_or_default(),
                }),
            },
            None => agent.execute_task(task).await,
        };
        self.ledger().agent_time += started.elapsed();
        result.map(|mut output| {
            output.confidence = clamp_confidence(output.confidence);
            output
        })
    }

    /// Run `jobs` concurrently within the concurrency bound.
    ///
    /// Results line up with `jobs`; dropped agents yield `None`. Under the
    /// abort policy the first failure cancels the remaining calls.
    pub async fn fan_out(&self, jobs: Vec<Job>) -> EngineResult<Vec<Option<AgentOutput>>> {
        let calls = jobs.into_iter().map(|job| async move {
            let _permit = match &self.semaphore {
                Some(semaphore) => semaphore.acquire().await.ok(),
                None => None,
            };
            self.invoke(&job.agent, job.stage, job.input).await
        });
        try_join_all(calls).await
    }

    fn mark_used(&self, agent_id: &str) {
        if let Some(idx) = self.agents.iter().position(|a| a.id() == agent_id) {
            self.ledger().used.insert(idx);
        }
    }

    fn stamp(&self, content: Value) -> Value {
        let mut body = match content {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("content".into(), other);
                map
            }
        };
        body.insert("executionId".into(), Value::from(self.execution_id.clone()));
        body.insert("pattern".into(), Value::from(self.pattern.as_str()));
        Value::Object(body)
    }

    /// Publish a coordination message to one agent, if a bus is attached.
    pub async fn notify(&self, from: &str, to: &str, message_type: MessageType, content: Value) {
        let message = Message::direct(from, to, message_type, self.stamp(content));
        self.send(message).await;
    }

    /// Broadcast a coordination message, if a bus is attached.
    pub async fn announce(&self, from: &str, message_type: MessageType, content: Value) {
        let message = Message::broadcast(from, message_type, self.stamp(content));
        self.send(message).await;
    }

    async fn send(&self, message: Message) {
        let Some(bus) = self.bus else {
            return;
        };
        if !bus.is_initialized() {
            return;
        }
        let sent = if message.to_agent_id.is_some() {
            bus.publish(message).await
        } else {
            bus.broadcast(message).await.map(|_| ())
        };
        match sent {
            Ok(()) => self.ledger().messages_sent += 1,
            Err(e) => debug!(error = %e, "coordination message not delivered"),
        }
    }

    /// Mirror `value` into shared memory; returns whether it was stored.
    pub async fn remember(&self, key: &str, value: Value) -> bool {
        match self.bus {
            Some(bus) if bus.is_initialized() => bus.set_shared_memory(key, value).await.is_ok(),
            _ => false,
        }
    }

    pub fn summary(&self) -> RunSummary {
        let ledger = self.ledger();
        RunSummary {
            baseline: ledger.agent_time,
            agents_used: ledger
                .used
                .iter()
                .map(|&i| self.agents[i].id().to_string())
                .collect(),
            messages_sent: ledger.messages_sent,
        }
    }
}

/// Mean confidence of `outputs`; `0.0` when empty.
pub(crate) fn mean_confidence<'o>(outputs: impl IntoIterator<Item = &'o AgentOutput>) -> f64 {
    let (sum, count) = outputs
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), o| (sum + o.confidence, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
