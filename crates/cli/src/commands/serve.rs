//! `switchyard serve` — start the gateway.

use switchyard_config::AppConfig;
use tracing::info;

pub async fn run(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    info!(
        host = %config.gateway.host,
        port = config.gateway.port,
        security = config.security.enable_api_security,
        "Starting Switchyard gateway"
    );

    switchyard_gateway::serve(config)
        .await
        .map_err(|e| anyhow::anyhow!("gateway failed: {e}"))
}
