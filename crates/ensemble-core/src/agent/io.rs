//! Payloads flowing into and out of agents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input handed to an agent: a payload plus a free-form context map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentInput {
    pub data: Value,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
}

impl AgentInput {
    pub fn new(data: impl Into<Value>) -> Self {
        Self {
            data: data.into(),
            context: BTreeMap::new(),
        }
    }

    /// Add a context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Build the next stage's input from a previous stage's output.
    ///
    /// The previous input's context is carried forward and the producing
    /// stage's confidence is recorded under `previousConfidence`.
    pub fn from_output(output: &AgentOutput, previous: &AgentInput) -> Self {
        let mut context = previous.context.clone();
        context.insert("previousConfidence".into(), Value::from(output.confidence));
        Self {
            data: output.result.clone(),
            context,
        }
    }

    /// Flatten the payload into text for keyword classification.
    pub fn text(&self) -> String {
        match &self.data {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Output produced by an agent.
///
/// `confidence` is always within `[0, 1]`; constructors clamp it and map
/// `NaN` to `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub result: Value,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl AgentOutput {
    pub fn new(result: impl Into<Value>, confidence: f64) -> Self {
        Self {
            result: result.into(),
            confidence: clamp_confidence(confidence),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether a reviewing agent flagged this output as approved.
    pub fn is_approved(&self) -> bool {
        matches!(self.metadata.get("approved"), Some(Value::Bool(true)))
    }
}

/// Clamp a confidence value into `[0, 1]`.
pub(crate) fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
