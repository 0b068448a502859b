//! Completion request and response types

use crate::message::{Message, MessageRole};
use crate::task::TaskCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

/// Completion request
///
/// Owned by the caller. The routing layer reads it and only ever fills in
/// `model` on a copy handed to the selected backend.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Model to use (set by the router from the resolved route)
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Stop sequences
    pub stop: Option<Vec<String>>,
    /// Explicit category; skips classification when set
    pub category_hint: Option<TaskCategory>,
    /// Quality the caller needs from the chosen route, in [0, 1]
    pub required_quality: Option<f64>,
    /// Free-form caller metadata
    pub metadata: HashMap<String, String>,
}

impl CompletionRequest {
    /// Create an empty request
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a request holding a single user message
    #[must_use]
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self::new().with_message(Message::user(prompt))
    }

    /// Add a message
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Add messages
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Pin the task category
    #[must_use]
    pub fn with_category(mut self, category: TaskCategory) -> Self {
        self.category_hint = Some(category);
        self
    }

    /// Only accept routes rated at least `quality`
    #[must_use]
    pub fn with_required_quality(mut self, quality: f64) -> Self {
        self.required_quality = Some(quality);
        self
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Copy of this request targeting `model`
    #[must_use]
    pub fn for_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    /// Text of the system and user messages, joined by newlines
    #[must_use]
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role != MessageRole::Assistant)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Rough size of the request in billing units
    ///
    /// Uses `max_tokens` when the caller set one, otherwise four characters
    /// of prompt per unit.
    #[must_use]
    pub fn estimated_units(&self) -> u32 {
        if let Some(max_tokens) = self.max_tokens {
            return max_tokens;
        }
        let chars: usize = self.messages.iter().map(|m| m.content.chars().count()).sum();
        u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
    }
}

/// Completion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,
    /// Token usage
    pub usage: Option<TokenUsage>,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Model used
    pub model: String,
}

/// One incremental piece of a streamed completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Text delta
    pub delta: String,
    /// Set on the final chunk when the backend reports one
    pub finish_reason: Option<String>,
}

impl StreamChunk {
    /// Create a text chunk
    #[must_use]
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            finish_reason: None,
        }
    }
}
