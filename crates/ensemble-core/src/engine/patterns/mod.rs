//! The nine coordination algorithms.
//!
//! Each algorithm receives the resolved [`Run`] and the caller's input and
//! returns an [`Outcome`]; the engine wraps it into a `PatternResult`.

mod collaborative_refinement;
mod competitive;
mod consensus;
mod feedback_loop;
mod hierarchical;
mod orchestrator_workers;
mod parallel;
mod routing;
mod sequential;

use super::error::EngineResult;
use super::pattern::PatternKind;
use super::run::{Outcome, Run};
use crate::agent::AgentInput;

pub(crate) async fn execute(run: &Run<'_>, input: AgentInput) -> EngineResult<Outcome> {
    match run.pattern {
        PatternKind::Sequential => sequential::run(run, input).await,
        PatternKind::Parallel => parallel::run(run, input).await,
        PatternKind::OrchestratorWorkers => orchestrator_workers::run(run, input).await,
        PatternKind::Routing => routing::run(run, input).await,
        PatternKind::Hierarchical => hierarchical::run(run, input).await,
        PatternKind::FeedbackLoop => feedback_loop::run(run, input).await,
        PatternKind::Consensus => consensus::run(run, input).await,
        PatternKind::Competitive => competitive::run(run, input).await,
        PatternKind::CollaborativeRefinement => collaborative_refinement::run(run, input).await,
    }
}
