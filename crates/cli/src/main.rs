//! Switchyard CLI — the main entry point.
//!
//! Commands:
//! - `serve`   — Start the JSON-RPC gateway
//! - `orgs`    — Manage organizations
//! - `keys`    — Manage API keys
//! - `agents`  — Inspect the agent registry
//! - `status`  — Show runtime configuration and store health

use clap::{Parser, Subcommand};
use switchyard_config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "switchyard",
    about = "Switchyard — A2A routing and orchestration runtime",
    version,
    long_about = "Switchyard routes JSON-RPC requests to local task handlers and remote \
                  agents, with API-key authentication, guardrails, intent classification, \
                  and multi-agent workflows."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP JSON-RPC gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the host (e.g. 0.0.0.0 for Docker)
        #[arg(long)]
        host: Option<String>,
    },

    /// Manage organizations
    Orgs {
        #[command(subcommand)]
        command: commands::orgs::OrgsCommand,
    },

    /// Manage API keys
    Keys {
        #[command(subcommand)]
        command: commands::keys::KeysCommand,
    },

    /// Inspect the agent registry
    Agents {
        #[command(subcommand)]
        command: commands::agents::AgentsCommand,
    },

    /// Show runtime configuration and store health
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let config = AppConfig::from_env();

    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(config, host, port).await,
        Commands::Orgs { command } => commands::orgs::run(config, command).await,
        Commands::Keys { command } => commands::keys::run(config, command).await,
        Commands::Agents { command } => commands::agents::run(config, command).await,
        Commands::Status => commands::status::run(config).await,
    }
}
