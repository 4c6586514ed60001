//! Coarse, capability-derived agent specializations.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Specialization tag used for team composition and routing.
///
/// Variants are declared in canonical order; classification picks the first
/// category whose keywords match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Specialization {
    Research,
    Analysis,
    Coding,
    Writing,
    Review,
    Planning,
    Data,
    General,
}

impl Specialization {
    /// Known categories in canonical order (excludes `General`).
    pub const KNOWN: [Specialization; 7] = [
        Specialization::Research,
        Specialization::Analysis,
        Specialization::Coding,
        Specialization::Writing,
        Specialization::Review,
        Specialization::Planning,
        Specialization::Data,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Specialization::Research => "research",
            Specialization::Analysis => "analysis",
            Specialization::Coding => "coding",
            Specialization::Writing => "writing",
            Specialization::Review => "review",
            Specialization::Planning => "planning",
            Specialization::Data => "data",
            Specialization::General => "general",
        }
    }

    /// Parse a tag such as `"coding"`; case-insensitive.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        Self::KNOWN
            .into_iter()
            .chain([Specialization::General])
            .find(|s| s.as_str() == tag)
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Specialization::Research => &[
                "research",
                "search",
                "investigat",
                "discover",
                "literature",
            ],
            Specialization::Analysis => &["analy", "reason", "evaluat", "statistic", "insight"],
            Specialization::Coding => &[
                "code",
                "coding",
                "program",
                "develop",
                "implement",
                "debug",
            ],
            Specialization::Writing => &["writ", "draft", "content", "document", "summar", "copy"],
            Specialization::Review => &["review", "critic", "critique", "audit", "verif", "qa"],
            Specialization::Planning => &["plan", "strateg", "schedul", "coordinat", "orchestrat"],
            Specialization::Data => &["data", "sql", "etl", "database", "dataset"],
            Specialization::General => &[],
        }
    }

    fn matches(self, text: &str) -> bool {
        self.keywords().iter().any(|k| text.contains(k))
    }

    /// Infer the specialization of an agent from its declared capabilities.
    pub fn infer(capabilities: &BTreeSet<String>) -> Self {
        let lowered: Vec<String> = capabilities
            .iter()
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::KNOWN
            .into_iter()
            .find(|s| lowered.iter().any(|c| s.matches(c)))
            .unwrap_or(Specialization::General)
    }

    /// Classify free text (task type, input payload) into a specialization.
    pub fn classify_text(text: &str) -> Self {
        let lowered = text.to_ascii_lowercase();
        Self::KNOWN
            .into_iter()
            .find(|s| s.matches(&lowered))
            .unwrap_or(Specialization::General)
    }
}

impl std::fmt::Display for Specialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
