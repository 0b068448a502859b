//! CLI module for Waypoint
//!
//! Provides commands:
//! - `validate`: Load and validate the routing configuration
//! - `explain`: Show where a prompt would be routed
//! - `simulate`: Drive scripted backends through the dispatcher

use clap::{Parser, Subcommand};
use waypoint_llm::TaskCategory;

pub mod explain;
pub mod simulate;
pub mod validate;

/// Waypoint LLM routing CLI
#[derive(Parser, Debug)]
#[command(name = "waypoint")]
#[command(about = "Task-aware LLM routing with circuit-breaking failover")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the configuration and report every problem
    Validate,
    /// Classify a prompt and print the route it would take
    Explain {
        /// Prompt text
        prompt: String,
        /// Skip classification and use this category
        #[arg(long, value_parser = parse_category)]
        category: Option<TaskCategory>,
        /// Max tokens, used for the cost estimate
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Minimum route quality the request needs
        #[arg(long)]
        min_quality: Option<f64>,
    },
    /// Fail the primary backend repeatedly and print breaker statuses
    Simulate {
        /// Prompt used for every request
        #[arg(long, default_value = "hello")]
        prompt: String,
        /// Consecutive primary failures to inject (defaults to the failure threshold)
        #[arg(long)]
        failures: Option<u32>,
        /// Total requests to send
        #[arg(long, default_value_t = 8)]
        requests: u32,
    },
}

fn parse_category(value: &str) -> Result<TaskCategory, String> {
    value.parse()
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Validate) => validate::run(),
        Some(Commands::Explain {
            prompt,
            category,
            max_tokens,
            min_quality,
        }) => explain::run(&prompt, category, max_tokens, min_quality),
        Some(Commands::Simulate {
            prompt,
            failures,
            requests,
        }) => simulate::run(&prompt, failures, requests).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
