//! Route decisions

use super::config::RouteDefinition;
use serde::Serialize;
use std::time::Duration;
use waypoint_llm::TaskCategory;

/// Resolved route for one request
///
/// Created fresh per request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDecision {
    /// Primary backend name
    pub primary_backend: String,
    /// Model requested from the primary
    pub primary_model: String,
    /// Fallback backend name
    pub fallback_backend: Option<String>,
    /// Model requested from the fallback
    pub fallback_model: Option<String>,
    /// Category the request was classified as
    pub category: TaskCategory,
    /// Strategy that produced this decision
    pub strategy_name: String,
    /// Route price per thousand units
    pub cost_per_thousand_units: Option<f64>,
    /// Price estimate for this request
    pub estimated_cost: Option<f64>,
    /// Latency bound of the route
    pub max_latency: Option<Duration>,
}

impl RouteDecision {
    /// Decision that follows `route` as configured
    #[must_use]
    pub fn from_route(route: &RouteDefinition, category: TaskCategory, strategy_name: &str) -> Self {
        let (fallback_backend, fallback_model) = match route.fallback() {
            Some((backend, model)) => (Some(backend.to_string()), Some(model.to_string())),
            None => (None, None),
        };
        Self {
            primary_backend: route.primary_backend.clone(),
            primary_model: route.primary_model.clone(),
            fallback_backend,
            fallback_model,
            category,
            strategy_name: strategy_name.to_string(),
            cost_per_thousand_units: route.cost_per_thousand_units,
            estimated_cost: None,
            max_latency: route.max_latency(),
        }
    }

    /// Fill in `estimated_cost` for a request of `units` billing units
    #[must_use]
    pub fn with_estimated_units(mut self, units: u32) -> Self {
        self.estimated_cost = self
            .cost_per_thousand_units
            .map(|cost| cost * f64::from(units) / 1000.0);
        self
    }

    /// Same decision with the fallback removed
    #[must_use]
    pub fn without_fallback(mut self) -> Self {
        self.fallback_backend = None;
        self.fallback_model = None;
        self
    }

    /// Fallback backend and model, when present
    #[must_use]
    pub fn fallback(&self) -> Option<(&str, &str)> {
        match (&self.fallback_backend, &self.fallback_model) {
            (Some(backend), Some(model)) => Some((backend.as_str(), model.as_str())),
            _ => None,
        }
    }

    /// Key of the breaker that guards this decision
    #[must_use]
    pub fn pair_key(&self) -> (String, Option<String>) {
        (self.primary_backend.clone(), self.fallback_backend.clone())
    }
}
