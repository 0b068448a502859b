//! Task-based routing

use super::config::RouteTable;
use super::decision::RouteDecision;
use super::strategy::RoutingStrategy;
use waypoint_llm::TaskCategory;

/// Uses the category's route, or the default route when none is mapped
///
/// When a category has several candidates the highest priority wins; equal
/// priorities keep configuration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskBasedStrategy;

impl TaskBasedStrategy {
    /// Registered name
    pub const NAME: &'static str = "task_based";
}

impl RoutingStrategy for TaskBasedStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn select_route(&self, category: TaskCategory, table: &RouteTable) -> RouteDecision {
        let route = table
            .candidates(category)
            .iter()
            .rev()
            .max_by_key(|route| route.priority)
            .unwrap_or_else(|| table.default_route());
        RouteDecision::from_route(route, category, Self::NAME)
    }
}
