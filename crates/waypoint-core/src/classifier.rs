//! Task classification
//!
//! Maps a request to a [`TaskCategory`]. An explicit hint on the request
//! always wins; otherwise the prompt text is scanned against an ordered
//! table of keyword rules and the first matching rule decides. Requests
//! that match nothing are [`TaskCategory::General`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use waypoint_llm::{CompletionRequest, TaskCategory};

/// Keywords that select one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    /// Category selected when any keyword matches
    pub category: TaskCategory,
    /// Case-insensitive whole-word keywords or phrases
    pub keywords: Vec<String>,
}

impl KeywordRule {
    /// Create a rule
    #[must_use]
    pub fn new(category: TaskCategory, keywords: &[&str]) -> Self {
        Self {
            category,
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        }
    }
}

/// Built-in rule table, in priority order
#[must_use]
pub fn default_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule::new(
            TaskCategory::CodeReview,
            &["code review", "review this code", "review my code", "pull request", "diff", "lint"],
        ),
        KeywordRule::new(
            TaskCategory::CodeGeneration,
            &[
                "implement",
                "write a function",
                "write code",
                "refactor",
                "code",
                "function",
                "compile",
                "debug",
                "unit test",
            ],
        ),
        KeywordRule::new(
            TaskCategory::Planning,
            &["plan", "roadmap", "step by step", "milestones", "break down", "schedule"],
        ),
        KeywordRule::new(
            TaskCategory::Analysis,
            &["analyze", "analyse", "analysis", "investigate", "compare", "root cause", "evaluate"],
        ),
        KeywordRule::new(
            TaskCategory::IntentDetection,
            &["intent", "what does the user want", "user wants"],
        ),
        KeywordRule::new(
            TaskCategory::Validation,
            &["validate", "verify", "is this correct", "check whether", "fact-check", "sanity check"],
        ),
        KeywordRule::new(
            TaskCategory::Summarization,
            &["summarize", "summarise", "summary", "tl;dr", "recap", "key points"],
        ),
        KeywordRule::new(
            TaskCategory::Classification,
            &["classify", "categorize", "categorise", "label", "sentiment"],
        ),
        KeywordRule::new(
            TaskCategory::Extraction,
            &["extract", "pull out", "parse"],
        ),
        KeywordRule::new(
            TaskCategory::Translation,
            &["translate", "translation", "into english", "in french", "in spanish"],
        ),
    ]
}

#[derive(Debug, Clone)]
struct CompiledRule {
    category: TaskCategory,
    pattern: Regex,
}

/// Keyword-table classifier
///
/// Deterministic and side-effect free.
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    rules: Vec<CompiledRule>,
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl TaskClassifier {
    /// Build a classifier from an ordered rule table
    ///
    /// Rules without usable keywords are skipped.
    #[must_use]
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        let rules = rules
            .into_iter()
            .filter_map(|rule| {
                let alternatives: Vec<String> = rule
                    .keywords
                    .iter()
                    .map(|k| k.trim())
                    .filter(|k| !k.is_empty())
                    .map(regex::escape)
                    .collect();
                if alternatives.is_empty() {
                    warn!(category = %rule.category, "Skipping classifier rule without keywords");
                    return None;
                }
                let source = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
                match Regex::new(&source) {
                    Ok(pattern) => Some(CompiledRule {
                        category: rule.category,
                        pattern,
                    }),
                    Err(e) => {
                        warn!(category = %rule.category, error = %e, "Skipping invalid classifier rule");
                        None
                    }
                }
            })
            .collect();
        Self { rules }
    }

    /// Classify a request
    #[must_use]
    pub fn classify(&self, request: &CompletionRequest) -> TaskCategory {
        if let Some(hint) = request.category_hint {
            return hint;
        }
        self.classify_text(&request.prompt_text())
    }

    /// Classify raw text against the rule table
    #[must_use]
    pub fn classify_text(&self, text: &str) -> TaskCategory {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(text))
            .map_or(TaskCategory::General, |rule| rule.category)
    }

    /// Categories covered by the rule table, in match order
    #[must_use]
    pub fn categories(&self) -> Vec<TaskCategory> {
        self.rules.iter().map(|r| r.category).collect()
    }
}
