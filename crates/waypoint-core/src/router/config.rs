//! Configuration types for routing
//!
//! This module contains the route definitions, the route table built from
//! them, and the deserializable configuration surface with its validation.

use crate::classifier::KeywordRule;
use crate::utils::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use waypoint_llm::TaskCategory;

// ============================================================================
// Route Definition
// ============================================================================

/// Primary and optional fallback backend/model pair for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDefinition {
    /// Backend name resolved through the registry
    pub primary_backend: String,
    /// Model requested from the primary backend
    pub primary_model: String,
    /// Fallback backend name
    #[serde(default)]
    pub fallback_backend: Option<String>,
    /// Model requested from the fallback backend
    #[serde(default)]
    pub fallback_model: Option<String>,
    /// Upper bound for one attempt, in milliseconds
    #[serde(default)]
    pub max_latency_ms: Option<i64>,
    /// Price per thousand units
    #[serde(default)]
    pub cost_per_thousand_units: Option<f64>,
    /// Quality score in [0, 1]
    #[serde(default)]
    pub minimum_quality: Option<f64>,
    /// Higher wins
    #[serde(default)]
    pub priority: i32,
    /// Extra candidate routes for the same category
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<RouteDefinition>,
}

impl RouteDefinition {
    /// Create a route without fallback
    #[must_use]
    pub fn new(primary_backend: impl Into<String>, primary_model: impl Into<String>) -> Self {
        Self {
            primary_backend: primary_backend.into(),
            primary_model: primary_model.into(),
            fallback_backend: None,
            fallback_model: None,
            max_latency_ms: None,
            cost_per_thousand_units: None,
            minimum_quality: None,
            priority: 0,
            alternatives: Vec::new(),
        }
    }

    /// Set the fallback pair
    #[must_use]
    pub fn with_fallback(mut self, backend: impl Into<String>, model: impl Into<String>) -> Self {
        self.fallback_backend = Some(backend.into());
        self.fallback_model = Some(model.into());
        self
    }

    /// Set the cost per thousand units
    #[must_use]
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost_per_thousand_units = Some(cost);
        self
    }

    /// Set the quality score
    #[must_use]
    pub fn with_quality(mut self, quality: f64) -> Self {
        self.minimum_quality = Some(quality);
        self
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the latency bound
    #[must_use]
    pub fn with_max_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency_ms = Some(i64::try_from(max_latency.as_millis()).unwrap_or(i64::MAX));
        self
    }

    /// Add an alternative candidate for the same category
    #[must_use]
    pub fn with_alternative(mut self, alternative: RouteDefinition) -> Self {
        self.alternatives.push(alternative);
        self
    }

    /// Fallback backend and model, when both are set
    #[must_use]
    pub fn fallback(&self) -> Option<(&str, &str)> {
        match (&self.fallback_backend, &self.fallback_model) {
            (Some(backend), Some(model)) => Some((backend.as_str(), model.as_str())),
            _ => None,
        }
    }

    /// Latency bound as a duration (non-positive values read as unset)
    #[must_use]
    pub fn max_latency(&self) -> Option<Duration> {
        self.max_latency_ms
            .and_then(|ms| u64::try_from(ms).ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    fn check(&self, label: &str, errors: &mut Vec<String>) {
        if self.primary_backend.trim().is_empty() {
            errors.push(format!("{label}: primary_backend is empty"));
        }
        if self.primary_model.trim().is_empty() {
            errors.push(format!("{label}: primary_model is empty"));
        }
        match (&self.fallback_backend, &self.fallback_model) {
            (Some(_), None) | (None, Some(_)) => errors.push(format!(
                "{label}: fallback_backend and fallback_model must be set together"
            )),
            (Some(backend), Some(model)) if backend.trim().is_empty() || model.trim().is_empty() => {
                errors.push(format!("{label}: fallback_backend and fallback_model must not be empty"));
            }
            _ => {}
        }
        if let Some(quality) = self.minimum_quality {
            if !(0.0..=1.0).contains(&quality) {
                errors.push(format!(
                    "{label}: minimum_quality must be within [0, 1] (got {quality})"
                ));
            }
        }
        if let Some(cost) = self.cost_per_thousand_units {
            if !cost.is_finite() || cost < 0.0 {
                errors.push(format!(
                    "{label}: cost_per_thousand_units must be a non-negative number (got {cost})"
                ));
            }
        }
        if let Some(ms) = self.max_latency_ms {
            if ms <= 0 {
                errors.push(format!("{label}: max_latency_ms must be greater than 0 (got {ms})"));
            }
        }
    }

    fn without_alternatives(&self) -> Self {
        Self {
            alternatives: Vec::new(),
            ..self.clone()
        }
    }
}

// ============================================================================
// Route Table
// ============================================================================

/// Category to candidate routes, plus the default route
///
/// Read-only once built.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: HashMap<TaskCategory, Vec<RouteDefinition>>,
    default_route: RouteDefinition,
}

impl RouteTable {
    /// Create a table holding only the default route
    #[must_use]
    pub fn new(default_route: RouteDefinition) -> Self {
        Self {
            routes: HashMap::new(),
            default_route: default_route.without_alternatives(),
        }
    }

    /// Add a candidate route for `category`
    ///
    /// The route's alternatives become candidates as well.
    #[must_use]
    pub fn with_route(mut self, category: TaskCategory, route: RouteDefinition) -> Self {
        self.insert(category, route);
        self
    }

    fn insert(&mut self, category: TaskCategory, route: RouteDefinition) {
        let candidates = self.routes.entry(category).or_default();
        candidates.push(route.without_alternatives());
        candidates.extend(route.alternatives.iter().map(RouteDefinition::without_alternatives));
    }

    /// Candidate routes for `category`, in configuration order
    #[must_use]
    pub fn candidates(&self, category: TaskCategory) -> &[RouteDefinition] {
        self.routes.get(&category).map_or(&[], Vec::as_slice)
    }

    /// Route used when nothing else applies
    #[must_use]
    pub fn default_route(&self) -> &RouteDefinition {
        &self.default_route
    }

    /// Every route with a human-readable location, sorted by category
    #[must_use]
    pub fn labelled(&self) -> Vec<(String, &RouteDefinition)> {
        let mut categories: Vec<&TaskCategory> = self.routes.keys().collect();
        categories.sort();

        let mut out = Vec::new();
        for category in categories {
            for (index, route) in self.routes[category].iter().enumerate() {
                out.push((format!("routes.{category}[{index}]"), route));
            }
        }
        out.push(("default_route".to_string(), &self.default_route));
        out
    }

    /// Every backend name referenced by the table
    #[must_use]
    pub fn backend_names(&self) -> BTreeSet<String> {
        self.labelled()
            .into_iter()
            .flat_map(|(_, route)| {
                std::iter::once(route.primary_backend.clone()).chain(route.fallback_backend.clone())
            })
            .collect()
    }

    /// Number of candidate routes, excluding the default
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    /// Whether only the default route is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Circuit Breaker Settings
// ============================================================================

/// Deserializable form of [`CircuitBreakerConfig`]
///
/// Durations are signed so negative input is reported instead of rejected by
/// the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Cool-down before probing, in milliseconds
    pub open_duration_ms: i64,
    /// Per-attempt deadline, in milliseconds
    pub request_timeout_ms: i64,
    /// Probe successes needed to close
    pub success_threshold_in_half_open: u32,
    /// Whether timeouts count as failures
    pub count_timeouts_as_failures: bool,
    /// Whether rate limits count as failures
    pub count_rate_limits_as_failures: bool,
    /// Concurrent probes allowed while half-open
    pub max_concurrent_probes_in_half_open: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let config = CircuitBreakerConfig::default();
        Self {
            failure_threshold: config.failure_threshold,
            open_duration_ms: millis(config.open_duration),
            request_timeout_ms: millis(config.request_timeout),
            success_threshold_in_half_open: config.success_threshold_in_half_open,
            count_timeouts_as_failures: config.count_timeouts_as_failures,
            count_rate_limits_as_failures: config.count_rate_limits_as_failures,
            max_concurrent_probes_in_half_open: config.max_concurrent_probes_in_half_open,
        }
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn duration(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or(0))
}

impl CircuitBreakerSettings {
    /// Convert to the runtime config (negative durations clamp to zero)
    #[must_use]
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold(self.failure_threshold)
            .with_open_duration(duration(self.open_duration_ms))
            .with_request_timeout(duration(self.request_timeout_ms))
            .with_success_threshold(self.success_threshold_in_half_open)
            .with_count_timeouts(self.count_timeouts_as_failures)
            .with_count_rate_limits(self.count_rate_limits_as_failures)
            .with_max_probes(self.max_concurrent_probes_in_half_open)
    }

    fn check(&self, errors: &mut Vec<String>) {
        if self.failure_threshold < 1 {
            errors.push("circuit_breaker.failure_threshold must be at least 1".to_string());
        }
        if self.success_threshold_in_half_open < 1 {
            errors.push(
                "circuit_breaker.success_threshold_in_half_open must be at least 1".to_string(),
            );
        }
        if self.max_concurrent_probes_in_half_open < 1 {
            errors.push(
                "circuit_breaker.max_concurrent_probes_in_half_open must be at least 1".to_string(),
            );
        }
        if self.open_duration_ms < 0 {
            errors.push(format!(
                "circuit_breaker.open_duration_ms must not be negative (got {})",
                self.open_duration_ms
            ));
        }
        if self.request_timeout_ms <= 0 {
            errors.push(format!(
                "circuit_breaker.request_timeout_ms must be greater than 0 (got {})",
                self.request_timeout_ms
            ));
        }
    }
}

// ============================================================================
// Routing Configuration
// ============================================================================

fn default_strategy() -> String {
    "task_based".to_string()
}

fn default_true() -> bool {
    true
}

/// Complete routing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Registered strategy name
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// When false, every request uses the default route
    #[serde(default = "default_true")]
    pub enable_multi_model_routing: bool,
    /// When false, fallbacks are stripped from every decision
    #[serde(default = "default_true")]
    pub enable_provider_fallback: bool,
    /// Quality floor for the cost-optimized strategy
    #[serde(default)]
    pub required_quality: Option<f64>,
    /// Per-category routes
    #[serde(default)]
    pub routes: HashMap<TaskCategory, RouteDefinition>,
    /// Route for unmapped categories
    #[serde(default)]
    pub default_route: Option<RouteDefinition>,
    /// Breaker settings shared by every pair
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    /// Health probe period; absent or 0 disables it
    #[serde(default)]
    pub health_check_interval_secs: Option<u64>,
    /// Replaces the built-in classifier rules when set
    #[serde(default)]
    pub classifier: Option<Vec<KeywordRule>>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            enable_multi_model_routing: true,
            enable_provider_fallback: true,
            required_quality: None,
            routes: HashMap::new(),
            default_route: None,
            circuit_breaker: CircuitBreakerSettings::default(),
            health_check_interval_secs: None,
            classifier: None,
        }
    }
}

impl RoutingConfig {
    /// Structural checks, one message per violated invariant
    ///
    /// Strategy-specific checks and backend resolution happen when the
    /// dispatcher is built.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let mut categories: Vec<&TaskCategory> = self.routes.keys().collect();
        categories.sort();
        for category in categories {
            let route = &self.routes[category];
            let label = format!("routes.{category}");
            route.check(&label, &mut errors);
            for (index, alternative) in route.alternatives.iter().enumerate() {
                let label = format!("{label}.alternatives[{index}]");
                alternative.check(&label, &mut errors);
                if !alternative.alternatives.is_empty() {
                    errors.push(format!("{label}: alternatives cannot be nested"));
                }
            }
        }

        match &self.default_route {
            Some(route) => {
                route.check("default_route", &mut errors);
                if !route.alternatives.is_empty() {
                    errors.push("default_route: alternatives are not allowed".to_string());
                }
            }
            None => errors.push("default_route is missing".to_string()),
        }

        if let Some(quality) = self.required_quality {
            if !(0.0..=1.0).contains(&quality) {
                errors.push(format!("required_quality must be within [0, 1] (got {quality})"));
            }
        }

        self.circuit_breaker.check(&mut errors);

        if let Some(rules) = &self.classifier {
            for rule in rules {
                if rule.keywords.iter().all(|k| k.trim().is_empty()) {
                    errors.push(format!("classifier rule for {} has no keywords", rule.category));
                }
            }
        }

        errors
    }

    /// Build the route table, `None` when the default route is missing
    #[must_use]
    pub fn route_table(&self) -> Option<RouteTable> {
        let mut table = RouteTable::new(self.default_route.clone()?);
        let mut categories: Vec<&TaskCategory> = self.routes.keys().collect();
        categories.sort();
        for category in categories {
            table.insert(*category, self.routes[category].clone());
        }
        Some(table)
    }

    /// Runtime breaker configuration
    #[must_use]
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        self.circuit_breaker.to_config()
    }

    /// Health probe period, `None` when disabled
    #[must_use]
    pub fn health_check_interval(&self) -> Option<Duration> {
        self.health_check_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
