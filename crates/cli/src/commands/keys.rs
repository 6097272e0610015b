//! `switchyard keys` — API key lifecycle against the configured store.

use clap::Subcommand;
use std::sync::Arc;
use switchyard_auth::{ApiKeyService, OrganizationStore, SqliteAuthStore};
use switchyard_config::AppConfig;
use switchyard_core::KeyEnvironment;
use uuid::Uuid;

#[derive(Subcommand)]
pub enum KeysCommand {
    /// Create a key for an organization (plaintext shown once)
    Create {
        /// Organization slug
        org: String,

        /// Key name
        name: String,

        /// Key environment
        #[arg(long, default_value = "test")]
        environment: KeyEnvironment,

        /// Scopes (defaults to the wildcard scope)
        #[arg(long)]
        scope: Vec<String>,

        /// Per-minute rate override
        #[arg(long)]
        rate_limit: Option<u32>,

        /// Days until expiry
        #[arg(long)]
        expires_in_days: Option<i64>,
    },

    /// List an organization's keys (redacted)
    List {
        /// Organization slug
        org: String,
    },

    /// Revoke a key
    Revoke {
        key_id: Uuid,

        #[arg(long, default_value = "revoked via CLI")]
        reason: String,
    },
}

pub async fn run(config: AppConfig, command: KeysCommand) -> anyhow::Result<()> {
    let store = Arc::new(SqliteAuthStore::new(&config.database.connection_string()).await?);
    let service = ApiKeyService::new(store.clone(), store.clone(), store.clone());

    match command {
        KeysCommand::Create {
            org,
            name,
            environment,
            scope,
            rate_limit,
            expires_in_days,
        } => {
            let organization = store
                .get_by_slug(&org)
                .await?
                .ok_or_else(|| anyhow::anyhow!("organization not found: {org}"))?;

            let scopes = if scope.is_empty() { None } else { Some(scope) };
            let created = service
                .create_key(
                    organization.id,
                    &name,
                    environment,
                    None,
                    scopes,
                    rate_limit,
                    expires_in_days,
                )
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;

            println!("Created key {} ({})", created.name, created.id);
            println!();
            println!("  {}", created.full_key);
            println!();
            println!("Store this key now — it will not be shown again.");
        }
        KeysCommand::List { org } => {
            let organization = store
                .get_by_slug(&org)
                .await?
                .ok_or_else(|| anyhow::anyhow!("organization not found: {org}"))?;
            let keys = service
                .list_keys(organization.id)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;

            if keys.is_empty() {
                println!("No keys for {org}.");
                return Ok(());
            }
            println!(
                "{:<38} {:<16} {:<6} {:<8} {:>10}",
                "ID", "NAME", "ENV", "ACTIVE", "REQUESTS"
            );
            for key in keys {
                println!(
                    "{:<38} {:<16} {:<6} {:<8} {:>10}   …{}",
                    key.id, key.name, key.environment, key.is_active, key.total_requests,
                    key.key_hint
                );
            }
        }
        KeysCommand::Revoke { key_id, reason } => {
            service
                .revoke_key(key_id, &reason, None)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("Revoked key {key_id}.");
        }
    }
    Ok(())
}
