//! Every agent competes; the best-scoring candidate wins.

use serde_json::{json, Value};

use crate::agent::{AgentInput, AgentOutput};
use crate::communication::MessageType;
use crate::engine::error::EngineResult;
use crate::engine::run::{Job, Outcome, Run, ENGINE_AGENT_ID};

pub(super) async fn run(run: &Run<'_>, input: AgentInput) -> EngineResult<Outcome> {
    let jobs = run
        .agents
        .iter()
        .map(|agent| Job::new(agent, "compete", input.clone()))
        .collect();
    let results = run.fan_out(jobs).await?;

    let candidates: Vec<(&str, f64, AgentOutput)> = run
        .agents
        .iter()
        .zip(results)
        .filter_map(|(agent, result)| {
            result.map(|output| {
                let score = match run.scorer {
                    Some(scorer) => scorer(&output),
                    None => output.confidence,
                };
                (agent.id(), score, output)
            })
        })
        .collect();

    let scores: Vec<Value> = candidates
        .iter()
        .map(|(id, score, _)| json!({ "agentId": id, "score": score }))
        .collect();

    // Strictly greater wins, so ties go to roster order.
    let (winner, score, output) = candidates
        .into_iter()
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
        .ok_or_else(|| run.all_failed())?;

    run.announce(
        ENGINE_AGENT_ID,
        MessageType::Notification,
        json!({ "event": "competition:won", "winner": winner, "score": score }),
    )
    .await;

    Ok(Outcome::new(output.with_metadata("winner", winner))
        .meta("totalCompetitors", run.agents.len())
        .meta("winner", winner)
        .meta("winningScore", score)
        .meta("scores", scores))
}
