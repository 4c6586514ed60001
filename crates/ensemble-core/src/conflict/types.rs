//! Conflict vocabulary: entries, conflicts, strategies and resolutions.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::ConflictError;
use crate::agent::io::clamp_confidence;
use crate::agent::AgentOutput;

/// One agent's position in a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub agent_id: String,
    pub output: AgentOutput,
    pub confidence: f64,
    /// Vote weight under weighted voting; `None` counts as 1.
    pub weight: Option<f64>,
}

impl ConflictEntry {
    /// Build an entry whose confidence is taken from the output.
    pub fn new(agent_id: impl Into<String>, output: AgentOutput) -> Self {
        Self {
            agent_id: agent_id.into(),
            confidence: clamp_confidence(output.confidence),
            output,
            weight: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Effective vote weight: defaults to 1, negative or `NaN` counts as 0.
    pub fn vote_weight(&self) -> f64 {
        self.weight.unwrap_or(1.0).max(0.0)
    }
}

/// A bundle of at least two disagreeing outputs.
///
/// Only [`ConflictResolver::create_conflict`](super::ConflictResolver::create_conflict)
/// builds conflicts, which keeps the two-entry minimum intact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    id: Uuid,
    entries: Vec<ConflictEntry>,
    created_at: DateTime<Utc>,
}

impl Conflict {
    pub(crate) fn new(entries: Vec<ConflictEntry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            entries,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn entries(&self) -> &[ConflictEntry] {
        &self.entries
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// How a conflict is arbitrated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// Largest group of deep-equal results wins.
    #[default]
    Voting,
    /// Like voting, but each member contributes its weight.
    WeightedVoting,
    /// Single most confident output wins.
    BestConfidence,
}

impl ResolutionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStrategy::Voting => "voting",
            ResolutionStrategy::WeightedVoting => "weighted-voting",
            ResolutionStrategy::BestConfidence => "best-confidence",
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = ConflictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "voting" => Ok(ResolutionStrategy::Voting),
            "weighted-voting" => Ok(ResolutionStrategy::WeightedVoting),
            "best-confidence" => Ok(ResolutionStrategy::BestConfidence),
            other => Err(ConflictError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Outcome of resolving a [`Conflict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub conflict_id: Uuid,
    pub strategy: ResolutionStrategy,
    /// The agreed `output.result`.
    pub resolution: Value,
    /// Winning group's mean confidence, or the winner's own confidence.
    pub confidence: f64,
    /// Agents whose output matched the resolution, in conflict order.
    pub winning_agents: Vec<String>,
    /// Votes (or summed weight) behind the resolution.
    pub support: f64,
    /// Number of distinct results seen.
    pub distinct_results: usize,
    /// SHA-256 of the canonical JSON of `resolution`.
    pub resolution_digest: String,
    pub resolved_at: DateTime<Utc>,
}
