//! Structured observability hooks for pattern execution.
//!
//! This module provides:
//! - Execution-scoped tracing spans via [`pattern_span`]
//! - Emission functions for key lifecycle events: pattern start/finish,
//!   agent failures, conflict resolution and bus traffic
//!
//! Field names are stable (`event = "pattern.started"`, ...) so log pipelines
//! can filter on them. Configure verbosity with `RUST_LOG`.

use tracing::{debug, info, warn, Span};

use crate::communication::MessageType;

/// Execution-scoped span for one pattern run.
///
/// Attach it to the run's future with [`tracing::Instrument`] so every event
/// emitted while the pattern executes is tagged with `execution_id` and
/// `pattern`:
///
/// ```ignore
/// run_pattern(...).instrument(obs::pattern_span("exec-123", "parallel")).await
/// ```
pub fn pattern_span(execution_id: &str, pattern: &str) -> Span {
    tracing::info_span!("ensemble.pattern", execution_id = %execution_id, pattern = %pattern)
}

/// Emit event: a pattern run started over `agents` participants.
pub fn emit_pattern_started(execution_id: &str, pattern: &str, agents: usize) {
    info!(
        event = "pattern.started",
        execution_id = %execution_id,
        pattern = %pattern,
        agents = agents
    );
}

/// Emit event: a pattern run finished.
pub fn emit_pattern_finished(
    execution_id: &str,
    pattern: &str,
    duration_ms: u64,
    agents_used: usize,
    iterations: u32,
    success: bool,
) {
    info!(
        event = "pattern.finished",
        execution_id = %execution_id,
        pattern = %pattern,
        duration_ms = duration_ms,
        agents_used = agents_used,
        iterations = iterations,
        success = success,
    );
}

/// Emit event: one agent attempt failed (warning level).
pub fn emit_agent_failed(
    execution_id: &str,
    agent_id: &str,
    attempt: u32,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "agent.failed",
        execution_id = %execution_id,
        agent_id = %agent_id,
        attempt = attempt,
        error = %error,
    );
}

/// Emit event: a conflict was resolved.
pub fn emit_conflict_resolved(conflict_id: &str, strategy: &str, confidence: f64, entries: usize) {
    info!(
        event = "conflict.resolved",
        conflict_id = %conflict_id,
        strategy = %strategy,
        confidence = confidence,
        entries = entries,
    );
}

/// Emit event: a message entered the bus (debug level).
pub fn emit_message_published(from: &str, to: Option<&str>, message_type: MessageType) {
    debug!(
        event = "message.published",
        from = %from,
        to = to.unwrap_or("*"),
        message_type = ?message_type,
    );
}
