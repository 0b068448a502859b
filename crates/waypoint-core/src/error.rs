//! Error types for waypoint-core
//!
//! Request-time failures use [`waypoint_llm::Error`]. The errors here are
//! raised while building the dispatcher and are fatal at startup.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// One or more configuration invariants are violated
    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    /// Routing strategy name is not registered
    #[error("unknown routing strategy: {0}")]
    UnknownStrategy(String),

    /// Backend error
    #[error("llm error: {0}")]
    Llm(#[from] waypoint_llm::Error),
}

impl Error {
    /// Every human-readable problem carried by this error
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::InvalidConfig(messages) => messages.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
