//! `switchyard agents` — inspect the agent registry.

use clap::Subcommand;
use switchyard_config::AppConfig;
use switchyard_mesh::{AgentClient, AgentRegistry, ClientConfig};

#[derive(Subcommand)]
pub enum AgentsCommand {
    /// List agents discovered from the environment and config file
    List,

    /// List every advertised capability
    Capabilities,

    /// Health-check every registered agent
    Ping,
}

pub async fn run(config: AppConfig, command: AgentsCommand) -> anyhow::Result<()> {
    let registry = AgentRegistry::with_sources(
        config
            .registry
            .config_path
            .as_deref()
            .map(std::path::Path::new),
    );

    match command {
        AgentsCommand::List => {
            let agents = registry.list();
            if agents.is_empty() {
                println!("No agents registered. Set AGENT_<NAME>_URL or EXTERNAL_AGENTS_CONFIG.");
                return Ok(());
            }
            println!("{:<24} {:<32} CAPABILITIES", "NAME", "URL");
            for card in agents {
                println!(
                    "{:<24} {:<32} {}",
                    card.name,
                    card.url,
                    card.capabilities.join(", ")
                );
            }
        }
        AgentsCommand::Capabilities => {
            for capability in registry.capabilities() {
                println!("{capability}");
            }
        }
        AgentsCommand::Ping => {
            let client_config = ClientConfig::default();
            for card in registry.list() {
                let client = AgentClient::new(&card.url, client_config);
                let healthy = client.health_check().await;
                println!(
                    "{:<24} {}",
                    card.name,
                    if healthy { "healthy" } else { "unreachable" }
                );
            }
        }
    }
    Ok(())
}
