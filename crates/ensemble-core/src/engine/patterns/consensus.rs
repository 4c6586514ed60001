//! Independent answers reconciled through the conflict resolver.

use serde_json::json;

use crate::agent::{AgentInput, AgentOutput};
use crate::communication::MessageType;
use crate::conflict::ConflictEntry;
use crate::engine::error::EngineResult;
use crate::engine::run::{Job, Outcome, Run, ENGINE_AGENT_ID};

pub(super) async fn run(run: &Run<'_>, input: AgentInput) -> EngineResult<Outcome> {
    let jobs = run
        .agents
        .iter()
        .map(|agent| Job::new(agent, "propose", input.clone()))
        .collect();
    let results = run.fan_out(jobs).await?;

    let mut proposals: Vec<(String, AgentOutput)> = run
        .agents
        .iter()
        .zip(results)
        .filter_map(|(agent, result)| result.map(|o| (agent.id().to_string(), o)))
        .collect();

    if proposals.len() < 2 {
        let (agent_id, output) = proposals.pop().ok_or_else(|| run.all_failed())?;
        return Ok(Outcome::new(output)
            .meta("participants", 1)
            .meta("resolution", "single-output")
            .meta("winningAgents", vec![agent_id]));
    }

    let participants = proposals.len();
    let entries = proposals
        .into_iter()
        .map(|(agent_id, output)| ConflictEntry::new(agent_id, output))
        .collect();
    let conflict = run.resolver.create_conflict(entries)?;
    let resolution = run.resolver.resolve(&conflict, run.settings.strategy).await?;

    run.announce(
        ENGINE_AGENT_ID,
        MessageType::Coordination,
        json!({
            "event": "consensus:reached",
            "conflictId": resolution.conflict_id,
            "winningAgents": resolution.winning_agents,
        }),
    )
    .await;

    let output = AgentOutput::new(resolution.resolution.clone(), resolution.confidence)
        .with_metadata("conflictId", resolution.conflict_id.to_string())
        .with_metadata("support", resolution.support);
    Ok(Outcome::new(output)
        .meta("participants", participants)
        .meta("resolution", resolution.strategy.as_str())
        .meta("conflictId", resolution.conflict_id.to_string())
        .meta("winningAgents", resolution.winning_agents)
        .meta("support", resolution.support)
        .meta("distinctResults", resolution.distinct_results))
}
