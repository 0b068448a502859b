//! Cost-optimized routing
//!
//! Among the category's candidates that satisfy the required quality, the
//! cheapest wins. The caller's requirement takes precedence over the
//! configured one, and a route without a `minimum_quality` rating always
//! qualifies. Equal costs are broken by higher priority, then by the
//! lexical order of the primary backend name, then of the primary model.
//! When no candidate qualifies the default route is used.

use super::config::{RouteDefinition, RouteTable};
use super::decision::RouteDecision;
use super::strategy::RoutingStrategy;
use std::cmp::Ordering;
use waypoint_llm::TaskCategory;

/// Picks the cheapest qualifying route
#[derive(Debug, Clone, Copy, Default)]
pub struct CostOptimizedStrategy {
    required_quality: Option<f64>,
}

impl CostOptimizedStrategy {
    /// Registered name
    pub const NAME: &'static str = "cost_optimized";

    /// Create with the quality floor used when a caller states none
    #[must_use]
    pub fn new(required_quality: Option<f64>) -> Self {
        Self { required_quality }
    }

    fn select(
        &self,
        category: TaskCategory,
        required_quality: Option<f64>,
        table: &RouteTable,
    ) -> RouteDecision {
        let route = table
            .candidates(category)
            .iter()
            .filter(|route| qualifies(route, required_quality))
            .min_by(|a, b| compare(a, b))
            .unwrap_or_else(|| table.default_route());
        RouteDecision::from_route(route, category, Self::NAME)
    }
}

fn qualifies(route: &RouteDefinition, required_quality: Option<f64>) -> bool {
    match (required_quality, route.minimum_quality) {
        (Some(required), Some(quality)) => quality >= required,
        _ => true,
    }
}

fn cost(route: &RouteDefinition) -> f64 {
    route.cost_per_thousand_units.unwrap_or(f64::INFINITY)
}

fn compare(a: &RouteDefinition, b: &RouteDefinition) -> Ordering {
    cost(a)
        .total_cmp(&cost(b))
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.primary_backend.cmp(&b.primary_backend))
        .then_with(|| a.primary_model.cmp(&b.primary_model))
}

impl RoutingStrategy for CostOptimizedStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn select_route(&self, category: TaskCategory, table: &RouteTable) -> RouteDecision {
        self.select(category, self.required_quality, table)
    }

    fn select_route_with_quality(
        &self,
        category: TaskCategory,
        required_quality: Option<f64>,
        table: &RouteTable,
    ) -> RouteDecision {
        self.select(category, required_quality.or(self.required_quality), table)
    }

    fn validate(&self, table: &RouteTable) -> Vec<String> {
        table
            .labelled()
            .into_iter()
            .filter(|(_, route)| route.cost_per_thousand_units.is_none())
            .map(|(label, _)| {
                format!("{label}: cost_per_thousand_units is required by the cost_optimized strategy")
            })
            .collect()
    }
}
