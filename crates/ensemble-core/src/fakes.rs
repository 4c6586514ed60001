//! In-memory agent fakes (testing and host-side demos).
//!
//! [`MockAgent`] satisfies the [`Agent`] contract without any model or tool
//! behind it: responses are scripted, latency and failures can be injected,
//! and every call is counted.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::{
    Agent, AgentAnalytics, AgentError, AgentOutput, AgentResult, AgentStatus, HealthReport, Task,
};

type Behavior = Arc<dyn Fn(&Task) -> AgentResult<AgentOutput> + Send + Sync>;

/// A scripted agent double.
///
/// Without any scripting the agent echoes its input:
/// `{"agent": <id>, "taskType": <type>, "data": <input data>}` with the
/// configured confidence (0.8 by default).
pub struct MockAgent {
    id: String,
    name: String,
    capabilities: BTreeSet<String>,
    status: Mutex<AgentStatus>,
    confidence: f64,
    latency: Duration,
    fixed_response: Option<Value>,
    scripted: Mutex<VecDeque<AgentResult<AgentOutput>>>,
    behavior: Option<Behavior>,
    fail_remaining: AtomicU64,
    always_fail: bool,
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    busy_nanos: AtomicU64,
    seen: Mutex<Vec<Task>>,
    started: Instant,
}

impl MockAgent {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            capabilities: BTreeSet::new(),
            status: Mutex::new(AgentStatus::Idle),
            confidence: 0.8,
            latency: Duration::ZERO,
            fixed_response: None,
            scripted: Mutex::new(VecDeque::new()),
            behavior: None,
            fail_remaining: AtomicU64::new(0),
            always_fail: false,
            calls: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            busy_nanos: AtomicU64::new(0),
            seen: Mutex::new(Vec::new()),
            started: Instant::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Always answer with `result` (at the configured confidence).
    pub fn with_response(mut self, result: impl Into<Value>) -> Self {
        self.fixed_response = Some(result.into());
        self
    }

    /// Queue one scripted outcome; queued outcomes are consumed before any
    /// other behaviour applies.
    pub fn push_outcome(self, outcome: AgentResult<AgentOutput>) -> Self {
        self.scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
        self
    }

    /// Compute every answer from the task.
    pub fn with_behavior<F>(mut self, behavior: F) -> Self
    where
        F: Fn(&Task) -> AgentResult<AgentOutput> + Send + Sync + 'static,
    {
        self.behavior = Some(Arc::new(behavior));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the first `n` calls, then behave normally.
    pub fn failing_times(self, n: u64) -> Self {
        self.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    pub fn always_failing(mut self) -> Self {
        self.always_fail = true;
        self
    }

    pub fn with_status(self, status: AgentStatus) -> Self {
        self.set_status(status);
        self
    }

    pub fn set_status(&self, status: AgentStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn into_handle(self) -> Arc<dyn Agent> {
        Arc::new(self)
    }

    /// Number of `execute_task` calls received.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every task received, in arrival order.
    pub fn seen_tasks(&self) -> Vec<Task> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next_outcome(&self, task: &Task) -> AgentResult<AgentOutput> {
        if let Some(outcome) = self
            .scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return outcome;
        }

        if self.always_fail {
            return Err(AgentError::failed(&self.id, "scripted failure"));
        }

        let pending_failures = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending_failures.is_ok() {
            return Err(AgentError::failed(&self.id, "transient failure"));
        }

        if let Some(behavior) = &self.behavior {
            return behavior(task);
        }

        let result = match &self.fixed_response {
            Some(value) => value.clone(),
            None => json!({
                "agent": self.id,
                "taskType": task.task_type,
                "data": task.input.data,
            }),
        };
        Ok(AgentOutput::new(result, self.confidence).with_metadata("agentId", self.id.clone()))
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    fn status(&self) -> AgentStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn execute_task(&self, task: &Task) -> AgentResult<AgentOutput> {
        let started = Instant::now();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(task.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = self.next_outcome(task);
        match &outcome {
            Ok(_) => self.successes.fetch_add(1, Ordering::SeqCst),
            Err(_) => self.failures.fetch_add(1, Ordering::SeqCst),
        };
        self.busy_nanos
            .fetch_add(started.elapsed().as_nanos() as u64, Ordering::SeqCst);
        outcome
    }

    async fn health_check(&self) -> AgentResult<HealthReport> {
        let analytics = self.analytics();
        Ok(HealthReport {
            status: self.status(),
            uptime: self.started.elapsed(),
            task_count: analytics.total_tasks,
            success_rate: analytics.success_rate(),
        })
    }

    fn analytics(&self) -> AgentAnalytics {
        let total = self.calls.load(Ordering::SeqCst);
        let busy = Duration::from_nanos(self.busy_nanos.load(Ordering::SeqCst));
        AgentAnalytics {
            total_tasks: total,
            successful_tasks: self.successes.load(Ordering::SeqCst),
            failed_tasks: self.failures.load(Ordering::SeqCst),
            average_latency: if total == 0 {
                Duration::ZERO
            } else {
                busy / total as u32
            },
        }
    }
}
