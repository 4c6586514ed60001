//! Producer drafts, critics review, until the critics are satisfied.

use serde_json::{json, Value};
use tokio::time::sleep;

use crate::agent::{AgentInput, AgentOutput};
use crate::communication::MessageType;
use crate::engine::error::EngineResult;
use crate::engine::pattern::IterationState;
use crate::engine::run::{mean_confidence, Job, Outcome, Run};

pub(super) async fn run(run: &Run<'_>, input: AgentInput) -> EngineResult<Outcome> {
    let producer = &run.agents[0];
    let critics = if run.agents.len() > 1 {
        &run.agents[1..]
    } else {
        &run.agents[..1]
    };
    let max_iterations = run.settings.max_iterations;

    let mut state = IterationState::Running;
    let mut iteration = 0u32;
    let mut draft: Option<AgentOutput> = None;
    let mut feedback: Vec<Value> = Vec::new();
    let mut review_confidence = 0.0;

    while state == IterationState::Running {
        iteration += 1;
        let producer_input = match &draft {
            None => input.clone(),
            Some(previous) => AgentInput::from_output(previous, &input)
                .with_context("feedback", feedback.clone())
                .with_context("iteration", iteration),
        };

        let Some(produced) = run.invoke(producer, "produce", producer_input).await? else {
            // Keep the last good draft if the producer drops out mid-loop.
            if draft.is_none() {
                return Err(run.all_failed());
            }
            state = IterationState::Exhausted;
            break;
        };

        let review_input = AgentInput::new(json!({
            "draft": produced.result,
            "original": input.data,
            "iteration": iteration,
        }));
        let jobs = critics
            .iter()
            .map(|critic| Job::new(critic, "critique", review_input.clone()))
            .collect();
        let results = run.fan_out(jobs).await?;

        feedback.clear();
        let mut approved = false;
        let mut reviews: Vec<AgentOutput> = Vec::new();
        for (critic, review) in critics.iter().zip(results) {
            let Some(review) = review else { continue };
            run.notify(
                critic.id(),
                producer.id(),
                MessageType::Feedback,
                json!({ "iteration": iteration, "confidence": review.confidence }),
            )
            .await;
            approved |= review.is_approved();
            feedback.push(review.result.clone());
            reviews.push(review);
        }
        review_confidence = mean_confidence(&reviews);
        draft = Some(produced);

        let converged = approved
            || (!reviews.is_empty() && review_confidence >= run.settings.convergence_threshold);
        state = if converged {
            IterationState::Converged
        } else if iteration >= max_iterations {
            IterationState::Exhausted
        } else {
            IterationState::Running
        };

        if state == IterationState::Running && !run.settings.inter_round_delay.is_zero() {
            sleep(run.settings.inter_round_delay).await;
        }
    }

    let output = draft.ok_or_else(|| run.all_failed())?;
    Ok(Outcome::new(output.with_metadata("state", state.as_str()))
        .iterations(iteration)
        .meta("state", state.as_str())
        .meta("critics", critics.len())
        .meta("reviewConfidence", review_confidence))
}
