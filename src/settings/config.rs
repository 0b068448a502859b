//! Application configuration types

use serde::{Deserialize, Serialize};
use waypoint_core::RoutingConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Routing, failover and classifier settings
    #[serde(default)]
    pub routing: RoutingConfig,
}
