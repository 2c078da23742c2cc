//! Stress Fleet CLI
//!
//! A command-line tool for creating, listing and deleting stress agents
//! through the orchestrator API.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::StressRequest;
use commands::agents;

/// Stress Fleet CLI
#[derive(Parser)]
#[command(name = "stressctl")]
#[command(author, version, about = "CLI for the Stress Fleet orchestrator", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via STRESS_API_URL env var)
    #[arg(long, env = "STRESS_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create stress agents
    Create {
        /// CPU target per agent in percent (clamped to 0-100)
        #[arg(long, allow_negative_numbers = true)]
        cpu: i32,

        /// Memory target per agent in MB (clamped to 1-4096)
        #[arg(long, allow_negative_numbers = true)]
        memory: i32,

        /// Number of agents to create
        #[arg(long, short, default_value_t = 1)]
        count: u32,

        /// Create the agents without starting the load
        #[arg(long)]
        inactive: bool,
    },

    /// List tracked agents
    List,

    /// Delete one agent, or all of them with --all
    Delete {
        /// Agent ID to delete
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<String>,

        /// Delete every tracked agent
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        agents::report_error(&e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let api_url = config.resolve_api_url(cli.api_url);
    if cli.verbose {
        output::print_info(&format!("Using API at {}", api_url));
    }

    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Create {
            cpu,
            memory,
            count,
            inactive,
        } => {
            let request = StressRequest {
                cpu_target: cpu,
                memory_target: memory,
                number_of_agents_to_create: count,
                is_active: !inactive,
            };
            agents::create_agents(&client, request, cli.format).await?;
        }
        Commands::List => {
            agents::list_agents(&client, cli.format).await?;
        }
        Commands::Delete { id, all } => match (id, all) {
            (_, true) => agents::delete_all_agents(&client, cli.format).await?,
            (Some(id), false) => agents::delete_agent(&client, &id, cli.format).await?,
            (None, false) => anyhow::bail!("an agent ID or --all is required"),
        },
    }

    Ok(())
}
