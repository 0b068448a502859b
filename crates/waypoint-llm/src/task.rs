//! Task categories used for routing
//!
//! A request is assigned exactly one category, either from an explicit hint
//! or by the classifier in `waypoint-core`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Task category for model routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum TaskCategory {
    /// Code generation and modification
    CodeGeneration,
    /// Code review
    CodeReview,
    /// Multi-step planning and reasoning
    Planning,
    /// Analysis and investigation
    Analysis,
    /// Detecting what the user is asking for
    IntentDetection,
    /// Checking a result against expectations
    Validation,
    /// Text summarization
    Summarization,
    /// Labelling and categorization
    Classification,
    /// Structured data extraction
    Extraction,
    /// Translation between languages
    Translation,
    /// Anything that matched no rule
    General,
}

impl TaskCategory {
    /// All categories, in declaration order
    #[must_use]
    pub fn all() -> &'static [TaskCategory] {
        &[
            Self::CodeGeneration,
            Self::CodeReview,
            Self::Planning,
            Self::Analysis,
            Self::IntentDetection,
            Self::Validation,
            Self::Summarization,
            Self::Classification,
            Self::Extraction,
            Self::Translation,
            Self::General,
        ]
    }

    /// Snake-case name, matching the configuration keys
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeGeneration => "code_generation",
            Self::CodeReview => "code_review",
            Self::Planning => "planning",
            Self::Analysis => "analysis",
            Self::IntentDetection => "intent_detection",
            Self::Validation => "validation",
            Self::Summarization => "summarization",
            Self::Classification => "classification",
            Self::Extraction => "extraction",
            Self::Translation => "translation",
            Self::General => "general",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("unknown task category: {s}"))
    }
}

impl TryFrom<String> for TaskCategory {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
