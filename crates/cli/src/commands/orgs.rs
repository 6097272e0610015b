//! `switchyard orgs` — organization management against the configured store.

use clap::Subcommand;
use std::sync::Arc;
use switchyard_auth::{Organization, OrganizationStore, SqliteAuthStore};
use switchyard_config::AppConfig;

#[derive(Subcommand)]
pub enum OrgsCommand {
    /// Create an organization
    Create {
        name: String,
        slug: String,
        email: String,

        /// Plan label
        #[arg(long, default_value = "free")]
        plan: String,

        /// Monthly request quota
        #[arg(long, default_value_t = 10_000)]
        monthly_limit: i64,

        /// Per-minute rate limit
        #[arg(long, default_value_t = 60)]
        rate_limit: u32,

        /// Maximum active API keys
        #[arg(long, default_value_t = 5)]
        max_keys: u32,
    },

    /// List organizations
    List {
        #[arg(long, default_value_t = 50)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
}

pub async fn run(config: AppConfig, command: OrgsCommand) -> anyhow::Result<()> {
    let store: Arc<SqliteAuthStore> =
        Arc::new(SqliteAuthStore::new(&config.database.connection_string()).await?);

    match command {
        OrgsCommand::Create {
            name,
            slug,
            email,
            plan,
            monthly_limit,
            rate_limit,
            max_keys,
        } => {
            let mut org = Organization::new(name, slug, email);
            org.plan = plan;
            org.monthly_request_limit = monthly_limit.max(0);
            org.rate_limit_per_minute = rate_limit.max(1);
            org.max_api_keys = max_keys.max(1);

            let created = OrganizationStore::create(store.as_ref(), org).await?;
            println!("Created organization {} ({})", created.slug, created.id);
        }
        OrgsCommand::List { limit, offset } => {
            let orgs = store.get_all(limit, offset, None).await?;
            if orgs.is_empty() {
                println!("No organizations.");
                return Ok(());
            }
            println!("{:<38} {:<20} {:<8} {:>10}", "ID", "SLUG", "ACTIVE", "MAX KEYS");
            for org in orgs {
                println!(
                    "{:<38} {:<20} {:<8} {:>10}",
                    org.id, org.slug, org.is_active, org.max_api_keys
                );
            }
        }
    }
    Ok(())
}
