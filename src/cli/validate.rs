//! `waypoint validate`

use crate::settings::{load_config, ScriptedBackends};
use anyhow::{bail, Result};
use waypoint_core::Dispatcher;

/// Load the configuration and build a dispatcher from it
pub fn run() -> Result<()> {
    let config = load_config()?;
    let backends = ScriptedBackends::for_config(&config.routing);

    match Dispatcher::from_config(&config.routing, backends.registry()) {
        Ok(dispatcher) => {
            let table = dispatcher.route_table();
            println!("Configuration is valid");
            println!("  strategy: {}", dispatcher.strategy_name());
            println!("  routes:   {}", table.len());
            println!(
                "  backends: {}",
                table.backend_names().into_iter().collect::<Vec<_>>().join(", ")
            );
            Ok(())
        }
        Err(e) => {
            let messages = e.messages();
            for message in &messages {
                eprintln!("  - {message}");
            }
            bail!("configuration has {} problem(s)", messages.len())
        }
    }
}
