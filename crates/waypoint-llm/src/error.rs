//! Error types for waypoint-llm
//!
//! Every backend failure is expressed in this taxonomy before it reaches the
//! circuit breaker, so the breaker can decide what counts as a failure.

use serde::Serialize;
use thiserror::Error;

/// Backend error type
#[derive(Debug, Error)]
pub enum Error {
    /// Backend reports it cannot serve requests
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// API error returned by the backend
    #[error("api error: {0}")]
    Api(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Credentials rejected by the backend
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimit,

    /// Circuit is open and there is no fallback to send the request to
    #[error("circuit open for backend {backend}, no fallback configured")]
    CircuitOpen {
        /// Primary backend whose circuit is open
        backend: String,
    },

    /// Caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// Backend name did not resolve in the registry
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// Capability not offered by the backend
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The fallback was tried after the primary and failed as well
    #[error("failover from {primary} to {fallback} failed: {source}")]
    Failover {
        /// Primary backend name
        primary: String,
        /// Fallback backend name
        fallback: String,
        /// Error returned by the fallback
        source: Box<Error>,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error class used for telemetry and breaker accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad route table or breaker config (startup only)
    Configuration,
    /// Backend could not serve the request
    BackendUnavailable,
    /// Request exceeded its deadline
    Timeout,
    /// Backend throttled the request
    RateLimited,
    /// No attempt was made because the circuit is open
    CircuitOpenFastFail,
    /// Caller-initiated cancellation
    CancellationRequested,
}

impl Error {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::RateLimit => ErrorKind::RateLimited,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpenFastFail,
            Self::Cancelled => ErrorKind::CancellationRequested,
            Self::UnknownBackend(_) => ErrorKind::Configuration,
            Self::Failover { source, .. } => source.kind(),
            Self::Unavailable(_)
            | Self::Api(_)
            | Self::Network(_)
            | Self::Authentication(_)
            | Self::InvalidResponse(_)
            | Self::Unsupported(_) => ErrorKind::BackendUnavailable,
        }
    }

    /// Whether the caller cancelled the request
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::CancellationRequested
    }

    /// Wrap a fallback error with the note that failover was attempted
    #[must_use]
    pub fn failover(primary: impl Into<String>, fallback: impl Into<String>, source: Error) -> Self {
        Self::Failover {
            primary: primary.into(),
            fallback: fallback.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(Error::Timeout(500).kind(), ErrorKind::Timeout);
        assert_eq!(Error::RateLimit.kind(), ErrorKind::RateLimited);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::CancellationRequested);
        assert_eq!(
            Error::Authentication("bad key".into()).kind(),
            ErrorKind::BackendUnavailable
        );
        assert_eq!(
            Error::CircuitOpen {
                backend: "openai".into()
            }
            .kind(),
            ErrorKind::CircuitOpenFastFail
        );
    }

    #[test]
    fn test_failover_keeps_fallback_kind() {
        let err = Error::failover("openai", "ollama", Error::RateLimit);
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(err.to_string().contains("failover from openai to ollama"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
