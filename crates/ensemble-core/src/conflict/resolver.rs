//! Deterministic conflict resolution.
//!
//! Outputs are grouped by deep equality of `output.result`. The group key is
//! the SHA-256 digest of the result's canonical JSON (object keys sorted), so
//! `{"a":1,"b":2}` and `{"b":2,"a":1}` vote together. Integral floats are
//! hashed as integers, so `1.0` and `1` vote together too.
//!
//! **Tie-break rules:**
//! - voting / weighted-voting: highest support, then highest summed
//!   confidence, then the group whose first member appears earliest.
//! - best-confidence: highest confidence, then earliest entry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::error::{ConflictError, ConflictResult};
use super::types::{Conflict, ConflictEntry, Resolution, ResolutionStrategy};
use crate::communication::{InterAgentCommunication, Message, MessageType};
use crate::obs;

/// Sender id used for resolution notifications on the bus.
pub const RESOLVER_AGENT_ID: &str = "conflict-resolver";

/// Resolver counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictStats {
    pub total_conflicts: u64,
    pub resolved_conflicts: u64,
    pub by_strategy: BTreeMap<ResolutionStrategy, u64>,
}

/// Creates conflicts and resolves them with a [`ResolutionStrategy`].
#[derive(Default)]
pub struct ConflictResolver {
    communication: Option<Arc<InterAgentCommunication>>,
    total_conflicts: AtomicU64,
    resolved_conflicts: AtomicU64,
    by_strategy: Mutex<BTreeMap<ResolutionStrategy, u64>>,
}

struct Group<'a> {
    digest: String,
    members: Vec<&'a ConflictEntry>,
    support: f64,
    confidence_sum: f64,
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a `conflict:resolved` broadcast for every resolution.
    pub fn with_communication(mut self, communication: Arc<InterAgentCommunication>) -> Self {
        self.communication = Some(communication);
        self
    }

    /// Bundle `entries` into a conflict.
    ///
    /// Returns [`ConflictError::Underspecified`] for fewer than two entries.
    pub fn create_conflict(&self, entries: Vec<ConflictEntry>) -> ConflictResult<Conflict> {
        if entries.len() < 2 {
            return Err(ConflictError::Underspecified {
                count: entries.len(),
            });
        }
        self.total_conflicts.fetch_add(1, Ordering::SeqCst);
        Ok(Conflict::new(entries))
    }

    /// Resolve `conflict` with `strategy`.
    pub async fn resolve(
        &self,
        conflict: &Conflict,
        strategy: ResolutionStrategy,
    ) -> ConflictResult<Resolution> {
        let resolution = match strategy {
            ResolutionStrategy::Voting => resolve_by_votes(conflict, strategy, |_| 1.0),
            ResolutionStrategy::WeightedVoting => {
                resolve_by_votes(conflict, strategy, ConflictEntry::vote_weight)
            }
            ResolutionStrategy::BestConfidence => resolve_by_confidence(conflict),
        }?;

        self.resolved_conflicts.fetch_add(1, Ordering::SeqCst);
        *self
            .by_strategy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(strategy)
            .or_default() += 1;

        obs::emit_conflict_resolved(
            &conflict.id().to_string(),
            strategy.as_str(),
            resolution.confidence,
            conflict.entries().len(),
        );
        self.notify(&resolution).await;
        Ok(resolution)
    }

    /// Resolve with the default strategy (voting).
    pub async fn resolve_default(&self, conflict: &Conflict) -> ConflictResult<Resolution> {
        self.resolve(conflict, ResolutionStrategy::default()).await
    }

    pub fn stats(&self) -> ConflictStats {
        ConflictStats {
            total_conflicts: self.total_conflicts.load(Ordering::SeqCst),
            resolved_conflicts: self.resolved_conflicts.load(Ordering::SeqCst),
            by_strategy: self
                .by_strategy
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }

    async fn notify(&self, resolution: &Resolution) {
        let Some(bus) = &self.communication else {
            return;
        };
        if !bus.is_initialized() {
            return;
        }
        let message = Message::broadcast(
            RESOLVER_AGENT_ID,
            MessageType::Notification,
            json!({
                "event": "conflict:resolved",
                "conflictId": resolution.conflict_id,
                "strategy": resolution.strategy,
                "confidence": resolution.confidence,
                "winningAgents": resolution.winning_agents,
            }),
        );
        if let Err(e) = bus.broadcast(message).await {
            debug!(error = %e, "resolution notification not sent");
        }
    }
}

/// Canonical digest of a result value.
pub(crate) fn result_digest(value: &Value) -> String {
    hex::encode(Sha256::digest(canonical(value).to_string().as_bytes()))
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Value::from(f as i64)
            }
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonical(v)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn group_entries<'a>(
    entries: &'a [ConflictEntry],
    vote: impl Fn(&ConflictEntry) -> f64,
) -> Vec<Group<'a>> {
    let mut groups: Vec<Group<'a>> = Vec::new();
    for entry in entries {
        let digest = result_digest(&entry.output.result);
        let position = groups.iter().position(|g| g.digest == digest);
        let group = match position {
            Some(i) => &mut groups[i],
            None => {
                groups.push(Group {
                    digest,
                    members: Vec::new(),
                    support: 0.0,
                    confidence_sum: 0.0,
                });
                let last = groups.len() - 1;
                &mut groups[last]
            }
        };
        group.members.push(entry);
        group.support += vote(entry);
        group.confidence_sum += entry.confidence;
    }
    groups
}

fn resolve_by_votes(
    conflict: &Conflict,
    strategy: ResolutionStrategy,
    vote: impl Fn(&ConflictEntry) -> f64,
) -> ConflictResult<Resolution> {
    let groups = group_entries(conflict.entries(), vote);
    let distinct_results = groups.len();

    // Groups are in first-seen order; only a strictly better group replaces
    // the current winner.
    let winner = groups
        .into_iter()
        .reduce(|best, candidate| {
            let better = candidate.support > best.support
                || (candidate.support == best.support
                    && candidate.confidence_sum > best.confidence_sum);
            if better {
                candidate
            } else {
                best
            }
        })
        .ok_or(ConflictError::Underspecified { count: 0 })?;

    let first = winner.members[0];
    Ok(Resolution {
        conflict_id: conflict.id(),
        strategy,
        resolution: first.output.result.clone(),
        confidence: winner.confidence_sum / winner.members.len() as f64,
        winning_agents: winner.members.iter().map(|e| e.agent_id.clone()).collect(),
        support: winner.support,
        distinct_results,
        resolution_digest: winner.digest,
        resolved_at: Utc::now(),
    })
}

fn resolve_by_confidence(conflict: &Conflict) -> ConflictResult<Resolution> {
    let entries = conflict.entries();
    let winner = entries
        .iter()
        .reduce(|best, candidate| {
            if candidate.confidence > best.confidence {
                candidate
            } else {
                best
            }
        })
        .ok_or(ConflictError::Underspecified { count: 0 })?;

    let distinct_results = group_entries(entries, |_| 1.0).len();
    Ok(Resolution {
        conflict_id: conflict.id(),
        strategy: ResolutionStrategy::BestConfidence,
        resolution: winner.output.result.clone(),
        confidence: winner.confidence,
        winning_agents: vec![winner.agent_id.clone()],
        support: 1.0,
        distinct_results,
        resolution_digest: result_digest(&winner.output.result),
        resolved_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentOutput;

    fn entry(agent: &str, result: Value, confidence: f64) -> ConflictEntry {
        ConflictEntry::new(agent, AgentOutput::new(result, confidence))
    }

    #[test]
    fn test_create_conflict_requires_two_entries() {
        let resolver = ConflictResolver::new();
        let err = resolver
            .create_conflict(vec![entry("a", json!(1), 0.5)])
            .unwrap_err();
        assert_eq!(err, ConflictError::Underspecified { count: 1 });
        assert_eq!(resolver.stats().total_conflicts, 0);
    }

    #[tokio::test]
    async fn test_voting_majority_wins() {
        let resolver = ConflictResolver::new();
        let conflict = resolver
            .create_conflict(vec![
                entry("a", json!({"answer": 42}), 0.6),
                entry("b", json!({"answer": 42}), 0.8),
                entry("c", json!({"answer": 7}), 0.99),
            ])
            .unwrap();

        let resolution = resolver
            .resolve(&conflict, ResolutionStrategy::Voting)
            .await
            .unwrap();
        assert_eq!(resolution.resolution, json!({"answer": 42}));
        assert_eq!(resolution.winning_agents, vec!["a", "b"]);
        assert!((resolution.confidence - 0.7).abs() < 1e-9);
        assert_eq!(resolution.distinct_results, 2);
    }

    #[tokio::test]
    async fn test_voting_tie_broken_by_confidence_then_first_seen() {
        let resolver = ConflictResolver::new();
        let conflict = resolver
            .create_conflict(vec![
                entry("a", json!("x"), 0.4),
                entry("b", json!("y"), 0.9),
            ])
            .unwrap();
        let by_confidence = resolver
            .resolve(&conflict, ResolutionStrategy::Voting)
            .await
            .unwrap();
        assert_eq!(by_confidence.resolution, json!("y"));

        let conflict = resolver
            .create_conflict(vec![
                entry("a", json!("x"), 0.5),
                entry("b", json!("y"), 0.5),
            ])
            .unwrap();
        let first_seen = resolver
            .resolve(&conflict, ResolutionStrategy::Voting)
            .await
            .unwrap();
        assert_eq!(first_seen.resolution, json!("x"));
    }

    #[tokio::test]
    async fn test_weighted_voting_uses_weights() {
        let resolver = ConflictResolver::new();
        let conflict = resolver
            .create_conflict(vec![
                entry("a", json!("x"), 0.5),
                entry("b", json!("x"), 0.5),
                entry("c", json!("y"), 0.5).with_weight(3.0),
            ])
            .unwrap();

        let voting = resolver
            .resolve(&conflict, ResolutionStrategy::Voting)
            .await
            .unwrap();
        assert_eq!(voting.resolution, json!("x"));

        let weighted = resolver
            .resolve(&conflict, ResolutionStrategy::WeightedVoting)
            .await
            .unwrap();
        assert_eq!(weighted.resolution, json!("y"));
        assert_eq!(weighted.support, 3.0);
    }

    #[tokio::test]
    async fn test_best_confidence_ignores_grouping() {
        let resolver = ConflictResolver::new();
        let conflict = resolver
            .create_conflict(vec![
                entry("a", json!("x"), 0.6),
                entry("b", json!("x"), 0.6),
                entry("c", json!("y"), 0.95),
                entry("d", json!("z"), 0.95),
            ])
            .unwrap();

        let resolution = resolver
            .resolve(&conflict, ResolutionStrategy::BestConfidence)
            .await
            .unwrap();
        assert_eq!(resolution.resolution, json!("y"));
        assert_eq!(resolution.winning_agents, vec!["c"]);
        assert_eq!(resolution.confidence, 0.95);
    }

    #[test]
    fn test_digest_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(result_digest(&a), result_digest(&b));
    }

    #[tokio::test]
    async fn test_integral_floats_vote_with_integers() {
        let resolver = ConflictResolver::new();
        let conflict = resolver
            .create_conflict(vec![
                entry("a", json!({"n": 1}), 0.5),
                entry("b", json!({"n": 1.0}), 0.5),
                entry("c", json!({"n": 2}), 0.9),
            ])
            .unwrap();
        let resolution = resolver
            .resolve(&conflict, ResolutionStrategy::Voting)
            .await
            .unwrap();
        assert_eq!(resolution.resolution, json!({"n": 1}));
        assert_eq!(resolution.winning_agents, vec!["a", "b"]);
        assert_ne!(result_digest(&json!(1.5)), result_digest(&json!(1)));
    }

    #[tokio::test]
    async fn test_stats_count_by_strategy() {
        let resolver = ConflictResolver::new();
        let conflict = resolver
            .create_conflict(vec![entry("a", json!(1), 0.5), entry("b", json!(2), 0.5)])
            .unwrap();
        resolver.resolve_default(&conflict).await.unwrap();
        resolver
            .resolve(&conflict, ResolutionStrategy::BestConfidence)
            .await
            .unwrap();

        let stats = resolver.stats();
        assert_eq!(stats.total_conflicts, 1);
        assert_eq!(stats.resolved_conflicts, 2);
        assert_eq!(stats.by_strategy[&ResolutionStrategy::Voting], 1);
        assert_eq!(stats.by_strategy[&ResolutionStrategy::BestConfidence], 1);
    }
}
