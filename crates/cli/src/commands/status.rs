//! `switchyard status` — configuration summary and store health.

use switchyard_auth::{OrganizationStore, SqliteAuthStore};
use switchyard_config::AppConfig;
use switchyard_mesh::AgentRegistry;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    println!("Switchyard {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Gateway:        {}:{}", config.gateway.host, config.gateway.port);
    println!("API security:   {}", config.security.enable_api_security);
    println!("LLM intent:     {}", config.intent.use_llm);
    println!(
        "Rate limits:    {}/min {}/hour {}/day",
        config.security.rate_limit_per_minute,
        config.security.rate_limit_per_hour,
        config.security.rate_limit_per_day
    );
    println!("Database:       {}", config.database.connection_string());
    println!("Audit dir:      {}", config.audit.dir);

    let registry = AgentRegistry::with_sources(
        config
            .registry
            .config_path
            .as_deref()
            .map(std::path::Path::new),
    );
    println!("Agents:         {}", registry.len());

    match SqliteAuthStore::new(&config.database.connection_string()).await {
        Ok(store) => {
            let orgs = store.count().await.unwrap_or(0);
            println!("Store:          reachable ({orgs} organizations)");
        }
        Err(e) => println!("Store:          UNREACHABLE ({e})"),
    }

    Ok(())
}
