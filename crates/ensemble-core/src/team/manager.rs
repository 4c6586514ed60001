//! Roster registry, team composition and load-aware agent selection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{TeamError, TeamResult};
use super::specialization::Specialization;
use crate::agent::{AgentHandle, Task};

/// Inclusive size bounds for [`AgentTeamManager::create_team`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSizeBounds {
    pub min: usize,
    pub max: usize,
}

impl TeamSizeBounds {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    fn validate(self) -> TeamResult<()> {
        if self.min == 0 || self.min > self.max {
            return Err(TeamError::InvalidBounds {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// A named, immutable group of registered agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    /// Member agent ids in selection order.
    pub members: Vec<String>,
    pub bounds: TeamSizeBounds,
    pub specializations: BTreeSet<Specialization>,
    pub created_at: DateTime<Utc>,
}

impl Team {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.members.iter().any(|m| m == agent_id)
    }
}

/// Roster summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    pub total_agents: usize,
    pub by_specialization: BTreeMap<Specialization, usize>,
    pub teams: usize,
    pub total_load: u64,
}

struct Member {
    agent: AgentHandle,
    specialization: Specialization,
    load: AtomicU64,
}

impl Member {
    fn load(&self) -> u64 {
        self.load.load(Ordering::SeqCst)
    }
}

/// Registry of agents with per-agent load counters and named teams.
///
/// Load counters are independent atomics; adjusting one agent's load never
/// blocks another's.
#[derive(Default)]
pub struct AgentTeamManager {
    members: RwLock<Vec<Arc<Member>>>,
    teams: RwLock<BTreeMap<String, Team>>,
}

impl AgentTeamManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `agent` with zero load. Returns its inferred specialization.
    pub fn register_agent(&self, agent: AgentHandle) -> TeamResult<Specialization> {
        let mut members = self.members.write().unwrap_or_else(|e| e.into_inner());
        if members.iter().any(|m| m.agent.id() == agent.id()) {
            return Err(TeamError::DuplicateAgent(agent.id().to_string()));
        }
        let specialization = Specialization::infer(agent.capabilities());
        debug!(agent_id = %agent.id(), specialization = %specialization, "agent registered");
        members.push(Arc::new(Member {
            agent,
            specialization,
            load: AtomicU64::new(0),
        }));
        Ok(specialization)
    }

    fn snapshot(&self) -> Vec<Arc<Member>> {
        self.members
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn member(&self, agent_id: &str) -> Option<Arc<Member>> {
        self.members
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|m| m.agent.id() == agent_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.members.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn agent(&self, agent_id: &str) -> Option<AgentHandle> {
        self.member(agent_id).map(|m| Arc::clone(&m.agent))
    }

    pub fn specialization_of(&self, agent_id: &str) -> Option<Specialization> {
        self.member(agent_id).map(|m| m.specialization)
    }

    pub fn load_of(&self, agent_id: &str) -> Option<u64> {
        self.member(agent_id).map(|m| m.load())
    }

    /// Build a team covering as many distinct specializations as `bounds`
    /// allow.
    ///
    /// One least-loaded representative is taken per specialization (canonical
    /// order, registration order on load ties), capped at `bounds.max`; the
    /// least-loaded remaining agents then top the team up to `bounds.min`.
    pub fn create_team(&self, name: impl Into<String>, bounds: TeamSizeBounds) -> TeamResult<Team> {
        let name = name.into();
        bounds.validate()?;

        let mut teams = self.teams.write().unwrap_or_else(|e| e.into_inner());
        if teams.contains_key(&name) {
            return Err(TeamError::DuplicateTeam(name));
        }

        let roster = self.snapshot();
        if roster.len() < bounds.min {
            return Err(TeamError::InsufficientAgents {
                required: bounds.min,
                available: roster.len(),
            });
        }

        let mut chosen: Vec<usize> = Vec::new();
        let mut categories: Vec<Specialization> = Specialization::KNOWN.to_vec();
        categories.push(Specialization::General);
        for category in categories {
            if chosen.len() == bounds.max {
                break;
            }
            if let Some(idx) = least_loaded(&roster, |i, m| {
                m.specialization == category && !chosen.contains(&i)
            }) {
                chosen.push(idx);
            }
        }
        while chosen.len() < bounds.min {
            match least_loaded(&roster, |i, _| !chosen.contains(&i)) {
                Some(idx) => chosen.push(idx),
                None => break,
            }
        }

        let team = Team {
            id: Uuid::new_v4(),
            name: name.clone(),
            members: chosen
                .iter()
                .map(|&i| roster[i].agent.id().to_string())
                .collect(),
            bounds,
            specializations: chosen.iter().map(|&i| roster[i].specialization).collect(),
            created_at: Utc::now(),
        };
        info!(team = %team.name, members = team.members.len(), "team created");
        teams.insert(name, team.clone());
        Ok(team)
    }

    pub fn team(&self, name: &str) -> Option<Team> {
        self.teams
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Registered agents with `specialization`, in registration order.
    pub fn agents_by_specialization(&self, specialization: Specialization) -> Vec<AgentHandle> {
        self.snapshot()
            .iter()
            .filter(|m| m.specialization == specialization)
            .map(|m| Arc::clone(&m.agent))
            .collect()
    }

    /// Adjust an agent's load by `delta`, flooring at zero. Returns the new
    /// load.
    pub fn update_agent_load(&self, agent_id: &str, delta: i64) -> TeamResult<u64> {
        let member = self
            .member(agent_id)
            .ok_or_else(|| TeamError::UnknownAgent(agent_id.to_string()))?;
        let apply = |current: u64| {
            if delta >= 0 {
                current.saturating_add(delta.unsigned_abs())
            } else {
                current.saturating_sub(delta.unsigned_abs())
            }
        };
        let previous = member
            .load
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(apply(n)))
            .unwrap_or_else(|n| n);
        Ok(apply(previous))
    }

    /// Best registered agent for `task`.
    pub fn optimal_agent(&self, task: &Task) -> Option<AgentHandle> {
        let candidates: Vec<AgentHandle> = self
            .snapshot()
            .iter()
            .map(|m| Arc::clone(&m.agent))
            .collect();
        self.optimal_agent_among(task, &candidates)
    }

    /// Best agent for `task` among `candidates`.
    ///
    /// The target specialization is the task's `specialization` metadata tag,
    /// or else the classification of its task type and input text. Offline
    /// candidates are ignored. When `requiredCapabilities` is set, candidates
    /// covering all of them are preferred. Among agents matching the target,
    /// the least loaded wins; when none match, the least loaded candidate
    /// overall wins. Remaining ties go to candidate order. Candidates that
    /// were never registered are treated as idle with an inferred
    /// specialization.
    pub fn optimal_agent_among(
        &self,
        task: &Task,
        candidates: &[AgentHandle],
    ) -> Option<AgentHandle> {
        let target = target_specialization(task);
        let required = task.required_capabilities();

        let mut scored: Vec<(&AgentHandle, Specialization, u64)> = candidates
            .iter()
            .filter(|a| a.status().is_available())
            .map(|a| match self.member(a.id()) {
                Some(m) => (a, m.specialization, m.load()),
                None => (a, Specialization::infer(a.capabilities()), 0),
            })
            .collect();

        if !required.is_empty() {
            let covering: Vec<_> = scored
                .iter()
                .filter(|(a, _, _)| covers(a, &required))
                .cloned()
                .collect();
            if !covering.is_empty() {
                scored = covering;
            }
        }

        let pick = |pool: &[(&AgentHandle, Specialization, u64)]| {
            pool.iter()
                .enumerate()
                .min_by_key(|(i, (_, _, load))| (*load, *i))
                .map(|(_, (a, _, _))| Arc::clone(a))
        };

        let matching: Vec<_> = scored
            .iter()
            .filter(|(_, s, _)| *s == target)
            .cloned()
            .collect();
        let choice = if matching.is_empty() {
            pick(&scored)
        } else {
            pick(&matching)
        };
        if let Some(agent) = &choice {
            debug!(agent_id = %agent.id(), target = %target, "optimal agent selected");
        }
        choice
    }

    pub fn stats(&self) -> TeamStats {
        let roster = self.snapshot();
        let mut by_specialization = BTreeMap::new();
        for member in &roster {
            *by_specialization.entry(member.specialization).or_insert(0) += 1;
        }
        TeamStats {
            total_agents: roster.len(),
            by_specialization,
            teams: self.teams.read().unwrap_or_else(|e| e.into_inner()).len(),
            total_load: roster.iter().map(|m| m.load()).sum(),
        }
    }
}

/// Specialization a task asks for.
pub(crate) fn target_specialization(task: &Task) -> Specialization {
    task.metadata
        .get("specialization")
        .and_then(|v| v.as_str())
        .and_then(Specialization::from_tag)
        .unwrap_or_else(|| {
            Specialization::classify_text(&format!("{} {}", task.task_type, task.input.text()))
        })
}

fn covers(agent: &AgentHandle, required: &[String]) -> bool {
    let caps: BTreeSet<String> = agent
        .capabilities()
        .iter()
        .map(|c| c.to_ascii_lowercase())
        .collect();
    required.iter().all(|r| caps.contains(r))
}

fn least_loaded(
    roster: &[Arc<Member>],
    eligible: impl Fn(usize, &Member) -> bool,
) -> Option<usize> {
    roster
        .iter()
        .enumerate()
        .filter(|(i, m)| eligible(*i, m))
        .min_by_key(|(i, m)| (m.load(), *i))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentInput, AgentStatus};
    use crate::fakes::MockAgent;

    fn agent(id: &str, caps: &[&str]) -> AgentHandle {
        MockAgent::new(id)
            .with_capabilities(caps.iter().copied())
            .into_handle()
    }

    fn manager_with(agents: &[(&str, &[&str])]) -> AgentTeamManager {
        let manager = AgentTeamManager::new();
        for (id, caps) in agents {
            manager.register_agent(agent(id, caps)).unwrap();
        }
        manager
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let manager = AgentTeamManager::new();
        assert_eq!(
            manager.register_agent(agent("a", &["coding"])).unwrap(),
            Specialization::Coding
        );
        assert_eq!(
            manager.register_agent(agent("a", &["writing"])).unwrap_err(),
            TeamError::DuplicateAgent("a".into())
        );
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_create_team_maximises_specializations() {
        let manager = manager_with(&[
            ("c1", &["coding"]),
            ("c2", &["code-review"]),
            ("c3", &["coding"]),
            ("w1", &["writing"]),
            ("r1", &["research"]),
        ]);
        // c2 infers Coding ("code" precedes "review" in canonical order)
        let team = manager
            .create_team("squad", TeamSizeBounds::new(2, 3))
            .unwrap();
        assert_eq!(team.members, vec!["r1", "c1", "w1"]);
        assert_eq!(team.specializations.len(), 3);
        assert_eq!(manager.team("squad"), Some(team));
    }

    #[test]
    fn test_create_team_tops_up_to_min() {
        let manager = manager_with(&[("a", &["coding"]), ("b", &["coding"]), ("c", &["coding"])]);
        manager.update_agent_load("b", 5).unwrap();
        let team = manager.create_team("coders", TeamSizeBounds::new(3, 4)).unwrap();
        assert_eq!(team.members, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_create_team_errors() {
        let manager = manager_with(&[("a", &["coding"])]);
        assert_eq!(
            manager.create_team("t", TeamSizeBounds::new(3, 2)).unwrap_err(),
            TeamError::InvalidBounds { min: 3, max: 2 }
        );
        assert_eq!(
            manager.create_team("t", TeamSizeBounds::new(2, 2)).unwrap_err(),
            TeamError::InsufficientAgents {
                required: 2,
                available: 1
            }
        );
        manager.create_team("t", TeamSizeBounds::new(1, 1)).unwrap();
        assert_eq!(
            manager.create_team("t", TeamSizeBounds::new(1, 1)).unwrap_err(),
            TeamError::DuplicateTeam("t".into())
        );
    }

    #[test]
    fn test_load_is_floored_at_zero() {
        let manager = manager_with(&[("a", &["coding"])]);
        assert_eq!(manager.update_agent_load("a", 2).unwrap(), 2);
        assert_eq!(manager.update_agent_load("a", -5).unwrap(), 0);
        assert_eq!(
            manager.update_agent_load("ghost", 1).unwrap_err(),
            TeamError::UnknownAgent("ghost".into())
        );
    }

    #[test]
    fn test_optimal_agent_prefers_matching_specialization_then_load() {
        let manager = manager_with(&[
            ("writer", &["writing"]),
            ("coder-1", &["coding"]),
            ("coder-2", &["coding"]),
        ]);
        manager.update_agent_load("coder-1", 3).unwrap();

        let task = Task::new("", "implement", AgentInput::new("a parser"));
        assert_eq!(manager.optimal_agent(&task).unwrap().id(), "coder-2");

        let tagged = Task::new("", "misc", AgentInput::new("x"))
            .with_metadata("specialization", "writing");
        assert_eq!(manager.optimal_agent(&tagged).unwrap().id(), "writer");
    }

    #[test]
    fn test_optimal_agent_falls_back_to_least_loaded() {
        let manager = manager_with(&[("a", &["coding"]), ("b", &["writing"])]);
        manager.update_agent_load("a", 1).unwrap();
        let task = Task::new("", "misc", AgentInput::new("hello"));
        assert_eq!(manager.optimal_agent(&task).unwrap().id(), "b");
    }

    #[test]
    fn test_optimal_agent_among_skips_offline_and_honours_capabilities() {
        let manager = AgentTeamManager::new();
        let offline = MockAgent::new("off")
            .with_capabilities(["coding"])
            .with_status(AgentStatus::Offline)
            .into_handle();
        let rust = agent("rust", &["coding", "rust"]);
        let plain = agent("plain", &["coding"]);
        let task = Task::new("", "implement", AgentInput::new("x"))
            .with_metadata("requiredCapabilities", serde_json::json!(["Rust"]));

        let pick = manager
            .optimal_agent_among(&task, &[offline, plain, rust])
            .unwrap();
        assert_eq!(pick.id(), "rust");
    }

    #[test]
    fn test_stats() {
        let manager = manager_with(&[("a", &["coding"]), ("b", &["coding"]), ("c", &[])]);
        manager.update_agent_load("a", 2).unwrap();
        manager.create_team("t", TeamSizeBounds::new(1, 2)).unwrap();

        let stats = manager.stats();
        assert_eq!(stats.total_agents, 3);
        assert_eq!(stats.by_specialization[&Specialization::Coding], 2);
        assert_eq!(stats.by_specialization[&Specialization::General], 1);
        assert_eq!(stats.teams, 1);
        assert_eq!(stats.total_load, 2);
        assert_eq!(manager.agents_by_specialization(Specialization::Coding).len(), 2);
    }
}
