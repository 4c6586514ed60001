//! One orchestrator decomposes the task, the remaining agents work it.

use serde_json::{json, Value};

use crate::agent::{AgentInput, AgentOutput};
use crate::communication::MessageType;
use crate::engine::error::EngineResult;
use crate::engine::run::{mean_confidence, Job, Outcome, Run};

/// Sub-tasks named by an orchestrator's output: a bare array, or an object
/// carrying a `subtasks` array.
fn subtasks(result: &Value) -> Option<Vec<Value>> {
    let items = match result {
        Value::Array(items) => items,
        Value::Object(map) => map.get("subtasks")?.as_array()?,
        _ => return None,
    };
    (!items.is_empty()).then(|| items.clone())
}

pub(super) async fn run(run: &Run<'_>, input: AgentInput) -> EngineResult<Outcome> {
    let (orchestrator, workers) = run
        .agents
        .split_first()
        .ok_or_else(|| run.all_failed())?;

    let plan = run.invoke(orchestrator, "orchestrate", input.clone()).await?;
    let decomposed = plan.as_ref().and_then(|p| subtasks(&p.result));

    // Either one job per sub-task (round-robin over workers) or the whole
    // input for every worker.
    let mut jobs = Vec::new();
    let mut assignment = Vec::new();
    match &decomposed {
        Some(items) => {
            for (index, item) in items.iter().enumerate() {
                let worker = &workers[index % workers.len()];
                let sub_input = AgentInput {
                    data: item.clone(),
                    context: input.context.clone(),
                }
                .with_context("subtaskIndex", index);
                jobs.push(Job::new(worker, "work", sub_input));
                assignment.push((index, worker));
            }
        }
        None => {
            for (index, worker) in workers.iter().enumerate() {
                jobs.push(Job::new(worker, "work", input.clone()));
                assignment.push((index, worker));
            }
        }
    }

    for (index, worker) in &assignment {
        run.notify(
            orchestrator.id(),
            worker.id(),
            MessageType::Task,
            json!({ "subtaskIndex": index }),
        )
        .await;
    }

    let results = run.fan_out(jobs).await?;
    let merged: Vec<(usize, &str, AgentOutput)> = assignment
        .iter()
        .zip(results)
        .filter_map(|((index, worker), result)| result.map(|o| (*index, worker.id(), o)))
        .collect();
    if merged.is_empty() {
        return Err(run.all_failed());
    }

    let confidence = mean_confidence(merged.iter().map(|(_, _, o)| o));
    let combined: Vec<Value> = merged
        .iter()
        .map(|(index, id, o)| json!({ "subtask": index, "agentId": id, "result": o.result }))
        .collect();

    Ok(Outcome::new(AgentOutput::new(combined, confidence))
        .meta("decomposed", decomposed.is_some())
        .meta("subtasks", assignment.len())
        .meta("workers", workers.len())
        .meta("completedSubtasks", merged.len()))
}
