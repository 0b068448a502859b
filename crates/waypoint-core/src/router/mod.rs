//! Router - route table and pluggable routing strategies
//!
//! A strategy is a pure function from a task category and the route table
//! to a [`RouteDecision`]. Strategies are registered by name so new ones can
//! be added without touching existing ones.
//!
//! # Module Structure
//!
//! - `config`: Route definitions, route table and routing configuration
//! - `decision`: The per-request route decision
//! - `strategy`: RoutingStrategy trait and the strategy registry
//! - `task_based`: Category lookup with default-route fallback
//! - `cost_optimized`: Cheapest route meeting the quality floor

mod config;
mod cost_optimized;
mod decision;
mod strategy;
mod task_based;


pub use config::{CircuitBreakerSettings, RouteDefinition, RouteTable, RoutingConfig};
pub use cost_optimized::CostOptimizedStrategy;
pub use decision::RouteDecision;
pub use strategy::{RoutingStrategy, StrategyRegistry};
pub use task_based::TaskBasedStrategy;
