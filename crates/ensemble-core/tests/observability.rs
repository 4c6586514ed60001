//! Structured tracing events emitted during pattern execution.
//!
//! Field names are part of the log contract; these tests pin the event names
//! a pipeline would filter on.

use ensemble_core::fakes::MockAgent;
use ensemble_core::obs::{
    emit_agent_failed, emit_conflict_resolved, emit_pattern_finished, emit_pattern_started,
    pattern_span,
};
use ensemble_core::{AgentError, AgentInput, AgenticWorkflowEngine, PatternConfig};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_pattern_lifecycle_events() {
    emit_pattern_started("exec-1", "parallel", 3);
    emit_pattern_finished("exec-1", "parallel", 120, 3, 1, true);

    assert!(logs_contain("pattern.started"));
    assert!(logs_contain("pattern.finished"));
    assert!(logs_contain("exec-1"));
}

#[traced_test]
#[test]
fn test_emit_agent_failed_logs_warning() {
    let err = AgentError::failed("coder", "model overloaded");
    emit_agent_failed("exec-2", "coder", 2, &err);

    assert!(logs_contain("agent.failed"));
    assert!(logs_contain("model overloaded"));
    assert!(logs_contain("WARN"));
}

#[traced_test]
#[test]
fn test_emit_conflict_resolved() {
    emit_conflict_resolved("conflict-9", "voting", 0.75, 3);
    assert!(logs_contain("conflict.resolved"));
    assert!(logs_contain("voting"));
}

#[traced_test]
#[test]
fn test_pattern_span_tags_events() {
    let span = pattern_span("exec-span", "routing");
    let _entered = span.enter();
    tracing::info!("inside the pattern");
    assert!(logs_contain("ensemble.pattern"));
    assert!(logs_contain("exec-span"));
}

#[traced_test]
#[tokio::test]
async fn test_engine_run_emits_events() {
    let engine = AgenticWorkflowEngine::default();
    engine
        .initialize(vec![
            MockAgent::new("a").with_response("same").into_handle(),
            MockAgent::new("b").with_response("same").into_handle(),
            MockAgent::new("flaky").always_failing().into_handle(),
        ])
        .await;

    engine
        .execute_pattern(
            &PatternConfig::new("consensus", ["a", "b", "flaky"]),
            AgentInput::new("q"),
        )
        .await
        .unwrap();
    engine.shutdown().await;

    assert!(logs_contain("pattern.started"));
    assert!(logs_contain("pattern.finished"));
    assert!(logs_contain("agent.failed"));
    assert!(logs_contain("conflict.resolved"));
    assert!(logs_contain("flush"));
}
