//! Managers delegate to sub-teams laid out as a complete tree.
//!
//! Agent `i` manages agents `i*b + 1 ..= i*b + b` (breadth-first layout with
//! fan-out `b`). A manager runs first; its output seeds each subordinate in
//! turn, and the subordinates' reports are folded into the manager's.

use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};

use crate::agent::{AgentInput, AgentOutput};
use crate::communication::MessageType;
use crate::engine::error::EngineResult;
use crate::engine::run::{Outcome, Run};

/// Number of layers in a complete tree of `n` nodes with fan-out `b`.
fn layers(n: usize, fanout: usize) -> usize {
    let mut depth = 0;
    let mut covered = 0usize;
    let mut width = 1usize;
    while covered < n {
        covered = covered.saturating_add(width);
        width = width.saturating_mul(fanout);
        depth += 1;
    }
    depth
}

fn children(index: usize, fanout: usize, n: usize) -> std::ops::Range<usize> {
    let first = index.saturating_mul(fanout).saturating_add(1).min(n);
    let end = first.saturating_add(fanout).min(n);
    first..end
}

fn run_node<'r>(
    run: &'r Run<'_>,
    index: usize,
    input: AgentInput,
) -> BoxFuture<'r, EngineResult<Option<AgentOutput>>> {
    async move {
        let manager = &run.agents[index];
        let fanout = run.settings.hierarchy_fanout;
        let own = run.invoke(manager, "manage", input.clone()).await?;

        // A failed manager passes its own input down unchanged.
        let seed = match &own {
            Some(output) => AgentInput::from_output(output, &input),
            None => input,
        };

        let mut reports: Vec<AgentOutput> = Vec::new();
        for child in children(index, fanout, run.agents.len()) {
            run.notify(
                manager.id(),
                run.agents[child].id(),
                MessageType::Task,
                json!({ "layerIndex": child }),
            )
            .await;
            if let Some(report) = run_node(run, child, seed.clone()).await? {
                reports.push(report);
            }
        }

        if own.is_none() && reports.is_empty() {
            return Ok(None);
        }

        let confidences: Vec<f64> = own
            .iter()
            .chain(reports.iter())
            .map(|o| o.confidence)
            .collect();
        let confidence = confidences.iter().sum::<f64>() / confidences.len() as f64;
        let folded = json!({
            "agentId": manager.id(),
            "result": own.as_ref().map_or(Value::Null, |o| o.result.clone()),
            "reports": reports.iter().map(|r| r.result.clone()).collect::<Vec<_>>(),
        });
        Ok(Some(AgentOutput::new(folded, confidence)))
    }
    .boxed()
}

pub(super) async fn run(run: &Run<'_>, input: AgentInput) -> EngineResult<Outcome> {
    let output = run_node(run, 0, input)
        .await?
        .ok_or_else(|| run.all_failed())?;
    Ok(Outcome::new(output)
        .meta("layers", layers(run.agents.len(), run.settings.hierarchy_fanout))
        .meta("fanout", run.settings.hierarchy_fanout))
}
