//! Engine configuration.
//!
//! Defaults apply to every pattern run; fields set on a
//! [`PatternConfig`](crate::engine::PatternConfig) override them per call.
//! Configuration can be embedded in a host's TOML file:
//!
//! ```toml
//! max_concurrency = 8
//! max_retries = 1
//! default_failure_policy = "retry"
//! consensus_strategy = "weighted-voting"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::conflict::ResolutionStrategy;
use crate::engine::FailurePolicy;

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables for [`AgenticWorkflowEngine`](crate::engine::AgenticWorkflowEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fan-out width at the conservative optimization level.
    pub max_concurrency: usize,
    /// Extra attempts per agent under the retry policy.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub default_max_iterations: u32,
    pub default_timeout_ms: Option<u64>,
    pub default_failure_policy: FailurePolicy,
    /// Mean confidence at which iterative patterns stop.
    pub convergence_threshold: f64,
    pub inter_round_delay_ms: u64,
    /// Children per manager in the hierarchical pattern.
    pub hierarchy_fanout: usize,
    /// Members of the collaborative-refinement group.
    pub refinement_group_size: usize,
    pub consensus_strategy: ResolutionStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_retries: 2,
            retry_backoff_ms: 0,
            default_max_iterations: 3,
            default_timeout_ms: None,
            default_failure_policy: FailurePolicy::Skip,
            convergence_threshold: 0.8,
            inter_round_delay_ms: 0,
            hierarchy_fanout: 2,
            refinement_group_size: 3,
            consensus_strategy: ResolutionStrategy::Voting,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be at least 1".into()));
        }
        if self.default_max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "default_max_iterations must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.convergence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "convergence_threshold must be within [0, 1], got {}",
                self.convergence_threshold
            )));
        }
        if self.hierarchy_fanout == 0 {
            return Err(ConfigError::Invalid("hierarchy_fanout must be at least 1".into()));
        }
        if self.refinement_group_size == 0 {
            return Err(ConfigError::Invalid(
                "refinement_group_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_failure_policy, FailurePolicy::Skip);
        assert_eq!(config.consensus_strategy, ResolutionStrategy::Voting);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            max_retries = 5
            default_failure_policy = "abort"
            consensus_strategy = "best-confidence"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.default_failure_policy, FailurePolicy::Abort);
        assert_eq!(config.consensus_strategy, ResolutionStrategy::BestConfidence);
        assert_eq!(config.max_concurrency, 4);
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        let err = EngineConfig::from_toml_str("convergence_threshold = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_policy_is_parse_error() {
        let err = EngineConfig::from_toml_str(r#"default_failure_policy = "panic""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hierarchy_fanout = 3\ndefault_timeout_ms = 500").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.hierarchy_fanout, 3);
        assert_eq!(config.default_timeout_ms, Some(500));
    }
}
