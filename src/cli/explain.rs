//! `waypoint explain`

use crate::settings::{load_config, ScriptedBackends};
use anyhow::{Context, Result};
use waypoint_core::Dispatcher;
use waypoint_llm::{CompletionRequest, TaskCategory};

/// Print the route decision for a prompt as JSON
pub fn run(
    prompt: &str,
    category: Option<TaskCategory>,
    max_tokens: Option<u32>,
    min_quality: Option<f64>,
) -> Result<()> {
    let config = load_config()?;
    let backends = ScriptedBackends::for_config(&config.routing);
    let dispatcher = Dispatcher::from_config(&config.routing, backends.registry())
        .context("Invalid routing configuration")?;

    let mut request = CompletionRequest::from_prompt(prompt);
    if let Some(category) = category {
        request = request.with_category(category);
    }
    if let Some(max_tokens) = max_tokens {
        request = request.with_max_tokens(max_tokens);
    }
    if let Some(quality) = min_quality {
        request = request.with_required_quality(quality);
    }

    let decision = dispatcher.route(&request);
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
