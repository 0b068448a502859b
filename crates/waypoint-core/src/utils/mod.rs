//! Utility modules for waypoint-core
//!
//! - circuit_breaker: Circuit breaker state machine for fault tolerance

mod circuit_breaker;

pub use circuit_breaker::{
    Admission, AttemptGuard, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus,
    CircuitState,
};
