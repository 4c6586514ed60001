//! Fan the same input out to every agent.

use serde_json::{json, Value};

use crate::agent::{AgentInput, AgentOutput};
use crate::communication::MessageType;
use crate::engine::error::EngineResult;
use crate::engine::run::{mean_confidence, Job, Outcome, Run, ENGINE_AGENT_ID};

pub(super) async fn run(run: &Run<'_>, input: AgentInput) -> EngineResult<Outcome> {
    let ids: Vec<&str> = run.agents.iter().map(|a| a.id()).collect();
    run.announce(
        ENGINE_AGENT_ID,
        MessageType::Coordination,
        json!({ "event": "parallel:dispatch", "agents": ids }),
    )
    .await;

    let jobs = run
        .agents
        .iter()
        .map(|agent| Job::new(agent, "parallel", input.clone()))
        .collect();
    let results = run.fan_out(jobs).await?;

    let succeeded: Vec<(&str, AgentOutput)> = run
        .agents
        .iter()
        .zip(results)
        .filter_map(|(agent, result)| result.map(|output| (agent.id(), output)))
        .collect();
    if succeeded.is_empty() {
        return Err(run.all_failed());
    }

    let confidence = mean_confidence(succeeded.iter().map(|(_, o)| o));
    let combined: Vec<Value> = succeeded
        .iter()
        .map(|(id, o)| json!({ "agentId": id, "result": o.result, "confidence": o.confidence }))
        .collect();

    Ok(Outcome::new(AgentOutput::new(combined, confidence))
        .meta("parallelization", run.agents.len())
        .meta("succeeded", succeeded.len()))
}
