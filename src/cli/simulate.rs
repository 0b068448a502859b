//! `waypoint simulate`
//!
//! Injects consecutive failures on the primary backend of the route a prompt
//! takes, sends requests through the dispatcher, and prints how each one
//! was served followed by every breaker's status.

use crate::settings::{load_config, ScriptedBackends};
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;
use waypoint_core::{Dispatcher, HealthProbe};
use waypoint_llm::{CompletionRequest, Error};

/// Run the simulation
pub async fn run(prompt: &str, failures: Option<u32>, requests: u32) -> Result<()> {
    let config = load_config()?;
    let backends = ScriptedBackends::for_config(&config.routing);
    let dispatcher = Dispatcher::from_config(&config.routing, backends.registry())
        .context("Invalid routing configuration")?;

    let cancel = CancellationToken::new();
    let probe = config
        .routing
        .health_check_interval()
        .map(|interval| HealthProbe::spawn(dispatcher.registry(), interval, cancel.child_token()));

    let request = CompletionRequest::from_prompt(prompt);
    let decision = dispatcher.route(&request);
    let failures = failures.unwrap_or(config.routing.circuit_breaker.failure_threshold);
    if let Some(primary) = backends.get(&decision.primary_backend) {
        primary.push_failures(failures as usize, || {
            Error::Unavailable(format!("{} is down (simulated)", decision.primary_backend))
        });
    }
    info!(
        category = %decision.category,
        primary = %decision.primary_backend,
        failures,
        requests,
        "Starting simulation"
    );

    for index in 1..=requests {
        match dispatcher.complete(request.clone(), &cancel).await {
            Ok(response) => println!("#{index}: {} ({})", response.content, response.model),
            Err(e) => println!("#{index}: error [{:?}] {e}", e.kind()),
        }
    }

    println!("{}", serde_json::to_string_pretty(&dispatcher.breaker_statuses())?);

    if let Some(probe) = probe {
        probe.first_round().await;
        cancel.cancel();
        println!("{}", serde_json::to_string_pretty(&probe.snapshot())?);
        probe.join().await;
    }
    Ok(())
}
