//! Skip, retry and abort policies, timeouts and offline agents.

use std::sync::Arc;
use std::time::Duration;

use ensemble_core::fakes::MockAgent;
use ensemble_core::{
    AgentError, AgentHandle, AgentInput, AgentStatus, AgenticWorkflowEngine, EngineConfig,
    EngineError, FailurePolicy, PatternConfig, PatternKind,
};
use serde_json::json;

async fn engine_with(agents: &[Arc<MockAgent>]) -> AgenticWorkflowEngine {
    let engine = AgenticWorkflowEngine::default();
    engine
        .initialize(agents.iter().map(|a| Arc::clone(a) as AgentHandle).collect())
        .await;
    engine
}

#[tokio::test]
async fn test_skip_drops_failing_agent_and_continues() {
    let agents = vec![
        Arc::new(MockAgent::new("a")),
        Arc::new(MockAgent::new("broken").always_failing()),
        Arc::new(MockAgent::new("c")),
    ];
    let engine = engine_with(&agents).await;

    let result = engine
        .execute_pattern(
            &PatternConfig::new("sequential", ["a", "broken", "c"]),
            AgentInput::new("x"),
        )
        .await
        .unwrap();

    assert_eq!(result.agents_used, vec!["a", "c"]);
    assert_eq!(result.metadata["skipped"], json!(1));
    assert_eq!(agents[1].call_count(), 1);
    // "c" picks up where "a" left off
    assert_eq!(agents[2].seen_tasks()[0].input.data["agent"], json!("a"));
}

#[tokio::test]
async fn test_retry_recovers_transient_failures() {
    let flaky = Arc::new(MockAgent::new("flaky").failing_times(2));
    let engine = engine_with(std::slice::from_ref(&flaky)).await;

    let config =
        PatternConfig::new("sequential", ["flaky"]).with_failure_policy(FailurePolicy::Retry);
    let result = engine
        .execute_pattern(&config, AgentInput::new("x"))
        .await
        .unwrap();

    assert_eq!(flaky.call_count(), 3);
    assert_eq!(result.agents_used, vec!["flaky"]);
}

#[tokio::test]
async fn test_retry_gives_up_after_max_retries() {
    let broken = Arc::new(MockAgent::new("broken").always_failing());
    let healthy = Arc::new(MockAgent::new("healthy"));
    let engine = engine_with(&[Arc::clone(&broken), Arc::clone(&healthy)]).await;

    let config = PatternConfig::new("parallel", ["broken", "healthy"])
        .with_failure_policy(FailurePolicy::Retry);
    let result = engine
        .execute_pattern(&config, AgentInput::new("x"))
        .await
        .unwrap();

    // one attempt plus the configured two retries
    assert_eq!(broken.call_count(), 3);
    assert_eq!(result.agents_used, vec!["healthy"]);
    assert_eq!(result.metadata["succeeded"], json!(1));
}

#[tokio::test]
async fn test_retry_budget_comes_from_engine_config() {
    let broken = Arc::new(MockAgent::new("broken").always_failing());
    let engine = AgenticWorkflowEngine::new(EngineConfig {
        max_retries: 0,
        default_failure_policy: FailurePolicy::Retry,
        ..EngineConfig::default()
    });
    engine.initialize(vec![Arc::clone(&broken) as AgentHandle]).await;

    let err = engine
        .execute_pattern(&PatternConfig::new("sequential", ["broken"]), AgentInput::new("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AllAgentsFailed { .. }));
    assert_eq!(broken.call_count(), 1);
}

#[tokio::test]
async fn test_abort_surfaces_agent_failure() {
    let agents = vec![
        Arc::new(MockAgent::new("a")),
        Arc::new(MockAgent::new("broken").always_failing()),
        Arc::new(MockAgent::new("never")),
    ];
    let engine = engine_with(&agents).await;

    let config = PatternConfig::new("sequential", ["a", "broken", "never"])
        .with_failure_policy(FailurePolicy::Abort);
    let err = engine
        .execute_pattern(&config, AgentInput::new("x"))
        .await
        .unwrap_err();

    match err {
        EngineError::AgentExecutionFailure { agent_id, source } => {
            assert_eq!(agent_id, "broken");
            assert!(matches!(source, AgentError::ExecutionFailed { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(agents[2].call_count(), 0);

    let metrics = engine.pattern_metrics(PatternKind::Sequential).unwrap();
    assert_eq!(metrics.total_executions, 1);
    assert_eq!(metrics.successful_executions, 0);
}

#[tokio::test]
async fn test_all_failed_is_recorded_as_unsuccessful() {
    let agents = vec![
        Arc::new(MockAgent::new("x").always_failing()),
        Arc::new(MockAgent::new("y").always_failing()),
    ];
    let engine = engine_with(&agents).await;

    let err = engine
        .execute_pattern(&PatternConfig::new("parallel", ["x", "y"]), AgentInput::new("q"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AllAgentsFailed { pattern } if pattern == "parallel"));

    let metrics = engine.pattern_metrics(PatternKind::Parallel).unwrap();
    assert_eq!(metrics.total_executions, 1);
    assert_eq!(metrics.successful_executions, 0);
    assert_eq!(metrics.success_rate, 0.0);
    assert_eq!(metrics.total_efficiency_gain, 0.0);
}

#[tokio::test]
async fn test_offline_agents_are_never_invoked() {
    let offline = Arc::new(MockAgent::new("offline").with_status(AgentStatus::Offline));
    let online = Arc::new(MockAgent::new("online"));
    let engine = engine_with(&[Arc::clone(&offline), Arc::clone(&online)]).await;

    let config = PatternConfig::new("parallel", ["offline", "online"])
        .with_failure_policy(FailurePolicy::Retry);
    let result = engine
        .execute_pattern(&config, AgentInput::new("x"))
        .await
        .unwrap();

    assert_eq!(offline.call_count(), 0);
    assert_eq!(result.agents_used, vec!["online"]);
}

#[tokio::test]
async fn test_routing_skips_offline_agents() {
    let offline = Arc::new(
        MockAgent::new("offline-coder")
            .with_capabilities(["coding"])
            .with_status(AgentStatus::Offline),
    );
    let fallback = Arc::new(MockAgent::new("writer").with_capabilities(["writing"]));
    let engine = engine_with(&[Arc::clone(&offline), Arc::clone(&fallback)]).await;

    let result = engine
        .execute_pattern(
            &PatternConfig::new("routing", ["offline-coder", "writer"]),
            AgentInput::new("implement the parser"),
        )
        .await
        .unwrap();
    assert_eq!(result.agents_used, vec!["writer"]);
    assert_eq!(offline.call_count(), 0);
}

#[tokio::test]
async fn test_routing_failure_is_reported() {
    let broken = Arc::new(MockAgent::new("broken").always_failing());
    let engine = engine_with(std::slice::from_ref(&broken)).await;

    let err = engine
        .execute_pattern(&PatternConfig::new("routing", ["broken"]), AgentInput::new("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AllAgentsFailed { pattern } if pattern == "routing"));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_when_nothing_finishes() {
    let slow = Arc::new(MockAgent::new("slow").with_latency(Duration::from_secs(30)));
    let engine = engine_with(std::slice::from_ref(&slow)).await;

    let config = PatternConfig::new("parallel", ["slow"]).with_timeout_ms(100);
    let err = engine
        .execute_pattern(&config, AgentInput::new("x"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Timeout { ref pattern, timeout_ms: 100 } if pattern == "parallel"
    ));
    let metrics = engine.pattern_metrics(PatternKind::Parallel).unwrap();
    assert_eq!(metrics.successful_executions, 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_keeps_agents_that_finished() {
    let fast = Arc::new(MockAgent::new("fast").with_latency(Duration::from_millis(10)));
    let slow = Arc::new(MockAgent::new("slow").with_latency(Duration::from_secs(30)));
    let engine = engine_with(&[Arc::clone(&fast), Arc::clone(&slow)]).await;

    let config = PatternConfig::new("parallel", ["fast", "slow"]).with_timeout_ms(100);
    let result = engine
        .execute_pattern(&config, AgentInput::new("x"))
        .await
        .unwrap();

    assert_eq!(result.agents_used, vec!["fast"]);
    assert!(result.execution_time >= Duration::from_millis(100));
    assert!(result.execution_time < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_cuts_iterative_patterns_short() {
    let producer = Arc::new(MockAgent::new("producer").with_latency(Duration::from_millis(40)));
    let critic = Arc::new(
        MockAgent::new("critic")
            .with_latency(Duration::from_millis(40))
            .with_confidence(0.1),
    );
    let engine = engine_with(&[Arc::clone(&producer), critic]).await;

    let config = PatternConfig::new("feedback-loop", ["producer", "critic"])
        .with_max_iterations(10)
        .with_timeout_ms(200);
    let result = engine
        .execute_pattern(&config, AgentInput::new("x"))
        .await
        .unwrap();

    // 80ms per round fits two full rounds before the deadline
    assert!(result.iterations < 10);
    assert_eq!(result.metadata["state"], json!("exhausted"));
}
