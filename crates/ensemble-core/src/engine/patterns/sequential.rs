//! Chain agents: each output becomes the next agent's input.

use serde_json::json;

use crate::agent::{AgentInput, AgentOutput};
use crate::communication::MessageType;
use crate::engine::error::EngineResult;
use crate::engine::run::{Outcome, Run};

pub(super) async fn run(run: &Run<'_>, input: AgentInput) -> EngineResult<Outcome> {
    let mut current = input;
    let mut last: Option<AgentOutput> = None;
    let mut completed = 0usize;

    for (position, agent) in run.agents.iter().enumerate() {
        // A dropped agent leaves the chain input untouched for its successor.
        let Some(output) = run.invoke(agent, "sequential", current.clone()).await? else {
            continue;
        };
        completed += 1;

        if let Some(next) = run.agents.get(position + 1) {
            run.notify(
                agent.id(),
                next.id(),
                MessageType::Task,
                json!({ "stage": position + 1, "confidence": output.confidence }),
            )
            .await;
        }
        current = AgentInput::from_output(&output, &current);
        last = Some(output);
    }

    let output = last.ok_or_else(|| run.all_failed())?;
    Ok(Outcome::new(output)
        .meta("steps", completed)
        .meta("skipped", run.agents.len() - completed))
}
