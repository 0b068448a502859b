//! Routing strategy contract and registry

use super::config::RouteTable;
use super::cost_optimized::CostOptimizedStrategy;
use super::decision::RouteDecision;
use super::task_based::TaskBasedStrategy;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use waypoint_llm::TaskCategory;

/// Pure selection of a route for a category
///
/// Implementations must not keep per-request state; the same table and
/// category always produce the same decision.
pub trait RoutingStrategy: Send + Sync {
    /// Name the strategy is registered under
    fn name(&self) -> &str;

    /// Pick a route for `category`
    fn select_route(&self, category: TaskCategory, table: &RouteTable) -> RouteDecision;

    /// Pick a route for `category` on behalf of a caller that needs at
    /// least `required_quality`
    ///
    /// Strategies that ignore quality keep the default.
    fn select_route_with_quality(
        &self,
        category: TaskCategory,
        _required_quality: Option<f64>,
        table: &RouteTable,
    ) -> RouteDecision {
        self.select_route(category, table)
    }

    /// Strategy-specific table checks, one message per problem
    fn validate(&self, _table: &RouteTable) -> Vec<String> {
        Vec::new()
    }
}

/// Strategies by name
#[derive(Default, Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn RoutingStrategy>>,
}

impl StrategyRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `task_based` and `cost_optimized`
    #[must_use]
    pub fn with_builtins(required_quality: Option<f64>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TaskBasedStrategy));
        registry.register(Arc::new(CostOptimizedStrategy::new(required_quality)));
        registry
    }

    /// Register a strategy under its own name, replacing any previous one
    pub fn register(&mut self, strategy: Arc<dyn RoutingStrategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    /// Look up a strategy
    pub fn get(&self, name: &str) -> Result<Arc<dyn RoutingStrategy>> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownStrategy(name.to_string()))
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }
}
