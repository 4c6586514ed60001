//! A fixed group revises one shared artifact round after round.

use serde_json::json;
use tokio::time::sleep;

use crate::agent::{AgentInput, AgentOutput};
use crate::communication::MessageType;
use crate::engine::error::EngineResult;
use crate::engine::pattern::IterationState;
use crate::engine::run::{mean_confidence, Job, Outcome, Run, ENGINE_AGENT_ID};

pub(super) async fn run(run: &Run<'_>, input: AgentInput) -> EngineResult<Outcome> {
    let group_size = run.settings.refinement_group_size.min(run.agents.len());
    let group = &run.agents[..group_size];
    let memory_key = format!("refinement:{}", run.execution_id);

    let mut state = IterationState::Running;
    let mut round = 0u32;
    let mut artifact = input.clone();
    let mut merged: Option<AgentOutput> = None;
    let mut mirrored = false;

    while state == IterationState::Running {
        round += 1;
        let jobs = group
            .iter()
            .map(|member| {
                Job::new(
                    member,
                    "refine",
                    artifact.clone().with_context("round", round),
                )
            })
            .collect();
        let revisions: Vec<AgentOutput> = run.fan_out(jobs).await?.into_iter().flatten().collect();

        if revisions.is_empty() {
            if merged.is_none() {
                return Err(run.all_failed());
            }
            state = IterationState::Exhausted;
            break;
        }

        let mean = mean_confidence(&revisions);
        // Highest confidence wins the round; ties go to group order.
        let Some(best) = revisions
            .into_iter()
            .reduce(|best, rev| if rev.confidence > best.confidence { rev } else { best })
        else {
            break;
        };
        let unchanged = best.result == artifact.data;

        mirrored |= run
            .remember(
                &memory_key,
                json!({ "round": round, "artifact": best.result, "confidence": best.confidence }),
            )
            .await;
        run.announce(
            ENGINE_AGENT_ID,
            MessageType::Coordination,
            json!({ "event": "refinement:round", "round": round, "confidence": mean }),
        )
        .await;

        artifact = AgentInput::from_output(&best, &input);
        merged = Some(best);

        state = if unchanged || mean >= run.settings.convergence_threshold {
            IterationState::Converged
        } else if round >= run.settings.max_iterations {
            IterationState::Exhausted
        } else {
            IterationState::Running
        };

        if state == IterationState::Running && !run.settings.inter_round_delay.is_zero() {
            sleep(run.settings.inter_round_delay).await;
        }
    }

    let output = merged.ok_or_else(|| run.all_failed())?;
    let mut outcome = Outcome::new(output.with_metadata("state", state.as_str()))
        .iterations(round)
        .meta("state", state.as_str())
        .meta("rounds", round)
        .meta("groupSize", group_size);
    if mirrored {
        outcome = outcome.meta("memoryKey", memory_key);
    }
    Ok(outcome)
}
