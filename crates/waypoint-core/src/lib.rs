//! Waypoint Core - Routing and Resilience Layer
//!
//! This crate decides which backend serves each completion request and keeps
//! requests flowing when a backend degrades:
//! - Classifier: Maps a request to a task category
//! - Router: Route table and pluggable routing strategies
//! - Failover: Primary/fallback pair guarded by a circuit breaker
//! - Dispatch: The facade callers use for complete, stream and embed
//! - Health: Optional periodic availability probe
//! - Utils: Circuit breaker state machine

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classifier;
pub mod dispatch;
pub mod error;
pub mod failover;
pub mod health;
pub mod router;
pub mod utils;

pub use classifier::{default_rules, KeywordRule, TaskClassifier};
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use failover::{pair_name, FailoverBackend};
pub use health::{probe_backends, BackendHealth, HealthProbe};
pub use router::{
    CircuitBreakerSettings, CostOptimizedStrategy, RouteDecision, RouteDefinition, RouteTable,
    RoutingConfig, RoutingStrategy, StrategyRegistry, TaskBasedStrategy,
};
pub use utils::{
    Admission, AttemptGuard, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus,
    CircuitState,
};
