//! Classify the task and hand it to exactly one agent.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::agent::{AgentHandle, AgentInput, Task};
use crate::communication::MessageType;
use crate::engine::error::EngineResult;
use crate::engine::run::{Outcome, Run, ENGINE_AGENT_ID};
use crate::team::manager::target_specialization;
use crate::team::Specialization;

/// Capability score of `agent` for a task targeting `target`: two points for
/// a matching specialization plus one per required capability it declares.
fn score(agent: &AgentHandle, target: Specialization, required: &[String]) -> usize {
    let caps: BTreeSet<String> = agent
        .capabilities()
        .iter()
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let specialization = if Specialization::infer(agent.capabilities()) == target {
        2
    } else {
        0
    };
    specialization + required.iter().filter(|r| caps.contains(*r)).count()
}

/// Pick the agent for `task`. Returns the agent, the method used and its
/// score (when scored).
fn classify<'r>(run: &'r Run<'_>, task: &Task) -> (&'r AgentHandle, &'static str, Option<usize>) {
    if let Some(team) = run.team {
        if let Some(chosen) = team.optimal_agent_among(task, &run.agents) {
            if let Some(agent) = run.agents.iter().find(|a| a.id() == chosen.id()) {
                return (agent, "team-manager", None);
            }
        }
    }

    let target = target_specialization(task);
    let required = task.required_capabilities();
    let best = run
        .agents
        .iter()
        .filter(|a| a.status().is_available())
        .map(|a| (a, score(a, target, &required)))
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best });

    match best {
        Some((agent, points)) => (agent, "capability-scoring", Some(points)),
        // Nothing available: route to the first agent and let the call fail.
        None => (&run.agents[0], "fallback", None),
    }
}

pub(super) async fn run(run: &Run<'_>, input: AgentInput) -> EngineResult<Outcome> {
    let mut task = Task::new(ENGINE_AGENT_ID, "route", input.clone());
    task.metadata = run.task_metadata.clone();

    let target = target_specialization(&task);
    let (agent, method, points) = classify(run, &task);
    let classification = json!({
        "agentId": agent.id(),
        "specialization": target.as_str(),
        "method": method,
        "score": points,
    });

    run.notify(
        ENGINE_AGENT_ID,
        agent.id(),
        MessageType::Task,
        json!({ "classification": classification }),
    )
    .await;

    let tracked = run
        .team
        .is_some_and(|team| team.update_agent_load(agent.id(), 1).is_ok());
    let result = run.invoke(agent, "route", input).await;
    if tracked {
        if let Some(team) = run.team {
            let _ = team.update_agent_load(agent.id(), -1);
        }
    }

    let output = result?.ok_or_else(|| run.all_failed())?;
    Ok(Outcome::new(output.with_metadata("classification", classification.clone()))
        .meta("classification", classification)
        .meta("candidates", Value::from(run.agents.len())))
}
