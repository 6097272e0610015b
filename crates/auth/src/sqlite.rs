//! SQLite auth store.
//!
//! One database, three tables: `organizations`, `api_keys`, `api_key_usage`.
//! Timestamps are RFC 3339 UTC strings, so lexicographic comparison matches
//! chronological order. Pass `sqlite::memory:` for tests.

use crate::models::{
    ApiKeyRecord, DailyStat, EndpointStat, ErrorStat, KeyStatistics, Organization, UsageRecord,
    UsageSummary,
};
use crate::repos::{
    ApiKeyStore, OrganizationStore, StoreError, UsageStore, month_start, next_month_start,
};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use switchyard_core::KeyEnvironment;
use tracing::info;
use uuid::Uuid;

/// SQLite-backed implementation of all three auth store traits.
pub struct SqliteAuthStore {
    pool: SqlitePool,
}

impl SqliteAuthStore {
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        Self::with_pool_size(url, 4).await
    }

    pub async fn with_pool_size(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(url, "SQLite auth store initialized");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        for (name, ddl) in [
            (
                "organizations",
                r#"
                CREATE TABLE IF NOT EXISTS organizations (
                    id                    TEXT PRIMARY KEY,
                    name                  TEXT NOT NULL,
                    slug                  TEXT NOT NULL UNIQUE,
                    email                 TEXT NOT NULL,
                    plan                  TEXT NOT NULL,
                    is_active             INTEGER NOT NULL,
                    monthly_request_limit INTEGER NOT NULL,
                    rate_limit_per_minute INTEGER NOT NULL,
                    max_api_keys          INTEGER NOT NULL,
                    created_at            TEXT NOT NULL
                )
                "#,
            ),
            (
                "api_keys",
                r#"
                CREATE TABLE IF NOT EXISTS api_keys (
                    id                TEXT PRIMARY KEY,
                    organization_id   TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
                    key_prefix        TEXT NOT NULL,
                    key_hash          TEXT NOT NULL UNIQUE,
                    key_hint          TEXT NOT NULL,
                    name              TEXT NOT NULL,
                    environment       TEXT NOT NULL,
                    scopes            TEXT NOT NULL,
                    custom_rate_limit INTEGER,
                    is_active         INTEGER NOT NULL,
                    created_at        TEXT NOT NULL,
                    last_used_at      TEXT,
                    expires_at        TEXT,
                    revoked_at        TEXT,
                    revoked_reason    TEXT,
                    revoked_by        TEXT,
                    description       TEXT,
                    total_requests    INTEGER NOT NULL DEFAULT 0
                )
                "#,
            ),
            (
                "api_key_usage",
                r#"
                CREATE TABLE IF NOT EXISTS api_key_usage (
                    id               TEXT PRIMARY KEY,
                    api_key_id       TEXT NOT NULL,
                    organization_id  TEXT NOT NULL,
                    timestamp        TEXT NOT NULL,
                    endpoint         TEXT NOT NULL,
                    method           TEXT NOT NULL,
                    status_code      INTEGER NOT NULL,
                    response_time_ms INTEGER,
                    tokens_used      INTEGER NOT NULL DEFAULT 0,
                    cost_usd         REAL NOT NULL DEFAULT 0,
                    ip_address       TEXT,
                    user_agent       TEXT,
                    error_code       TEXT,
                    error_message    TEXT
                )
                "#,
            ),
            (
                "usage index",
                "CREATE INDEX IF NOT EXISTS idx_usage_org_time
                 ON api_key_usage(organization_id, timestamp)",
            ),
            (
                "key hash index",
                "CREATE INDEX IF NOT EXISTS idx_api_keys_hash ON api_keys(key_hash)",
            ),
        ] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{name}: {e}")))?;
        }
        Ok(())
    }
}

fn parse_time(value: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_time(value: Option<String>) -> Option<DateTime<Utc>> {
    value.map(parse_time)
}

fn parse_uuid(value: String) -> Uuid {
    Uuid::parse_str(&value).unwrap_or_default()
}

fn org_from_row(row: &sqlx::sqlite::SqliteRow) -> Organization {
    Organization {
        id: parse_uuid(row.get("id")),
        name: row.get("name"),
        slug: row.get("slug"),
        email: row.get("email"),
        plan: row.get("plan"),
        is_active: row.get::<i64, _>("is_active") != 0,
        monthly_request_limit: row.get("monthly_request_limit"),
        rate_limit_per_minute: row.get::<i64, _>("rate_limit_per_minute") as u32,
        max_api_keys: row.get::<i64, _>("max_api_keys") as u32,
        created_at: parse_time(row.get("created_at")),
    }
}

fn key_from_row(row: &sqlx::sqlite::SqliteRow) -> ApiKeyRecord {
    let scopes: String = row.get("scopes");
    let environment: String = row.get("environment");
    ApiKeyRecord {
        id: parse_uuid(row.get("id")),
        organization_id: parse_uuid(row.get("organization_id")),
        key_prefix: row.get("key_prefix"),
        key_hash: row.get("key_hash"),
        key_hint: row.get("key_hint"),
        name: row.get("name"),
        environment: environment.parse().unwrap_or(KeyEnvironment::Test),
        scopes: serde_json::from_str(&scopes).unwrap_or_default(),
        custom_rate_limit: row
            .get::<Option<i64>, _>("custom_rate_limit")
            .map(|v| v as u32),
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: parse_time(row.get("created_at")),
        last_used_at: parse_opt_time(row.get("last_used_at")),
        expires_at: parse_opt_time(row.get("expires_at")),
        revoked_at: parse_opt_time(row.get("revoked_at")),
        revoked_reason: row.get("revoked_reason"),
        revoked_by: row
            .get::<Option<String>, _>("revoked_by")
            .map(parse_uuid),
        description: row.get("description"),
        total_requests: row.get("total_requests"),
    }
}

fn usage_from_row(row: &sqlx::sqlite::SqliteRow) -> UsageRecord {
    UsageRecord {
        id: parse_uuid(row.get("id")),
        api_key_id: parse_uuid(row.get("api_key_id")),
        organization_id: parse_uuid(row.get("organization_id")),
        timestamp: parse_time(row.get("timestamp")),
        endpoint: row.get("endpoint"),
        method: row.get("method"),
        status_code: row.get::<i64, _>("status_code") as u16,
        response_time_ms: row.get("response_time_ms"),
        tokens_used: row.get("tokens_used"),
        cost_usd: row.get("cost_usd"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        error_code: row.get("error_code"),
        error_message: row.get("error_message"),
    }
}

fn storage(e: sqlx::Error) -> StoreError {
    StoreError::Storage(e.to_string())
}

fn query_failed(e: sqlx::Error) -> StoreError {
    StoreError::QueryFailed(e.to_string())
}

#[async_trait]
impl OrganizationStore for SqliteAuthStore {
    async fn create(&self, org: Organization) -> Result<Organization, StoreError> {
        sqlx::query(
            "INSERT INTO organizations
                (id, name, slug, email, plan, is_active, monthly_request_limit,
                 rate_limit_per_minute, max_api_keys, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(org.id.to_string())
        .bind(&org.name)
        .bind(&org.slug)
        .bind(&org.email)
        .bind(&org.plan)
        .bind(org.is_active as i64)
        .bind(org.monthly_request_limit)
        .bind(org.rate_limit_per_minute as i64)
        .bind(org.max_api_keys as i64)
        .bind(org.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(org)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Organization>, StoreError> {
        let row = sqlx::query("SELECT * FROM organizations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(row.as_ref().map(org_from_row))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Organization>, StoreError> {
        let row = sqlx::query("SELECT * FROM organizations WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(row.as_ref().map(org_from_row))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Organization>, StoreError> {
        let row = sqlx::query("SELECT * FROM organizations WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(row.as_ref().map(org_from_row))
    }

    async fn get_all(
        &self,
        limit: i64,
        offset: i64,
        is_active: Option<bool>,
    ) -> Result<Vec<Organization>, StoreError> {
        let rows = match is_active {
            Some(active) => {
                sqlx::query(
                    "SELECT * FROM organizations WHERE is_active = ?
                     ORDER BY created_at LIMIT ? OFFSET ?",
                )
                .bind(active as i64)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM organizations ORDER BY created_at LIMIT ? OFFSET ?")
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(query_failed)?;
        Ok(rows.iter().map(org_from_row).collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM organizations")
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(row.get("n"))
    }

    async fn update(&self, org: &Organization) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE organizations SET
                name = ?, slug = ?, email = ?, plan = ?, is_active = ?,
                monthly_request_limit = ?, rate_limit_per_minute = ?, max_api_keys = ?
             WHERE id = ?",
        )
        .bind(&org.name)
        .bind(&org.slug)
        .bind(&org.email)
        .bind(&org.plan)
        .bind(org.is_active as i64)
        .bind(org.monthly_request_limit)
        .bind(org.rate_limit_per_minute as i64)
        .bind(org.max_api_keys as i64)
        .bind(org.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE organizations SET is_active = ? WHERE id = ?")
            .bind(active as i64)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn api_key_count(&self, id: Uuid) -> Result<u32, StoreError> {
        self.get_active_count(id).await
    }
}

#[async_trait]
impl ApiKeyStore for SqliteAuthStore {
    async fn create(&self, key: ApiKeyRecord) -> Result<ApiKeyRecord, StoreError> {
        let scopes = serde_json::to_string(&key.scopes)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        sqlx::query(
            "INSERT INTO api_keys
                (id, organization_id, key_prefix, key_hash, key_hint, name, environment,
                 scopes, custom_rate_limit, is_active, created_at, last_used_at, expires_at,
                 revoked_at, revoked_reason, revoked_by, description, total_requests)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(key.id.to_string())
        .bind(key.organization_id.to_string())
        .bind(&key.key_prefix)
        .bind(&key.key_hash)
        .bind(&key.key_hint)
        .bind(&key.name)
        .bind(key.environment.as_str())
        .bind(&scopes)
        .bind(key.custom_rate_limit.map(|v| v as i64))
        .bind(key.is_active as i64)
        .bind(key.created_at.to_rfc3339())
        .bind(key.last_used_at.map(|t| t.to_rfc3339()))
        .bind(key.expires_at.map(|t| t.to_rfc3339()))
        .bind(key.revoked_at.map(|t| t.to_rfc3339()))
        .bind(&key.revoked_reason)
        .bind(key.revoked_by.map(|id| id.to_string()))
        .bind(&key.description)
        .bind(key.total_requests)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(key)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ApiKeyRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(row.as_ref().map(key_from_row))
    }

    async fn get_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE key_hash = ?")
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(row.as_ref().map(key_from_row))
    }

    async fn get_by_organization(
        &self,
        organization_id: Uuid,
        active: Option<bool>,
        environment: Option<KeyEnvironment>,
    ) -> Result<Vec<ApiKeyRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM api_keys
             WHERE organization_id = ?
               AND (? IS NULL OR is_active = ?)
               AND (? IS NULL OR environment = ?)
             ORDER BY created_at",
        )
        .bind(organization_id.to_string())
        .bind(active.map(|a| a as i64))
        .bind(active.map(|a| a as i64))
        .bind(environment.map(|e| e.as_str()))
        .bind(environment.map(|e| e.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(rows.iter().map(key_from_row).collect())
    }

    async fn update_last_used(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn increment_request_count(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE api_keys SET total_requests = total_requests + 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn revoke(
        &self,
        id: Uuid,
        reason: &str,
        revoked_by: Option<Uuid>,
    ) -> Result<bool, StoreError> {
        // Idempotent: only the first revocation writes the timestamp
        let result = sqlx::query(
            "UPDATE api_keys
             SET revoked_at = ?, revoked_reason = ?, revoked_by = ?, is_active = 0
             WHERE id = ? AND revoked_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(reason)
        .bind(revoked_by.map(|id| id.to_string()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        // Distinguish "already revoked" from "missing"
        Ok(ApiKeyStore::get_by_id(self, id).await?.is_some())
    }

    async fn get_active_count(&self, organization_id: Uuid) -> Result<u32, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM api_keys
             WHERE organization_id = ? AND is_active = 1 AND revoked_at IS NULL",
        )
        .bind(organization_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(row.get::<i64, _>("n") as u32)
    }

    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE expires_at IS NOT NULL AND expires_at < ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected())
    }

    async fn get_expiring_soon(&self, within_days: i64) -> Result<Vec<ApiKeyRecord>, StoreError> {
        let now = Utc::now();
        let horizon = now + Duration::days(within_days);
        let rows = sqlx::query(
            "SELECT * FROM api_keys
             WHERE is_active = 1 AND expires_at IS NOT NULL
               AND expires_at > ? AND expires_at <= ?",
        )
        .bind(now.to_rfc3339())
        .bind(horizon.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(rows.iter().map(key_from_row).collect())
    }

    async fn get_unused(&self, for_days: i64) -> Result<Vec<ApiKeyRecord>, StoreError> {
        let cutoff = (Utc::now() - Duration::days(for_days)).to_rfc3339();
        let rows = sqlx::query(
            "SELECT * FROM api_keys
             WHERE is_active = 1 AND (last_used_at IS NULL OR last_used_at < ?)",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(rows.iter().map(key_from_row).collect())
    }

    async fn get_statistics(&self, organization_id: Uuid) -> Result<KeyStatistics, StoreError> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            "SELECT
                COUNT(*) AS total,
                SUM(CASE WHEN is_active = 1 AND revoked_at IS NULL
                         AND (expires_at IS NULL OR expires_at >= ?) THEN 1 ELSE 0 END) AS active,
                SUM(CASE WHEN revoked_at IS NOT NULL THEN 1 ELSE 0 END) AS revoked,
                SUM(CASE WHEN expires_at IS NOT NULL AND expires_at < ? THEN 1 ELSE 0 END) AS expired
             FROM api_keys WHERE organization_id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(organization_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(KeyStatistics {
            total: row.get("total"),
            active: row.get::<Option<i64>, _>("active").unwrap_or(0),
            revoked: row.get::<Option<i64>, _>("revoked").unwrap_or(0),
            expired: row.get::<Option<i64>, _>("expired").unwrap_or(0),
        })
    }
}

#[async_trait]
impl UsageStore for SqliteAuthStore {
    async fn create(&self, usage: UsageRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO api_key_usage
                (id, api_key_id, organization_id, timestamp, endpoint, method, status_code,
                 response_time_ms, tokens_used, cost_usd, ip_address, user_agent,
                 error_code, error_message)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(usage.id.to_string())
        .bind(usage.api_key_id.to_string())
        .bind(usage.organization_id.to_string())
        .bind(usage.timestamp.to_rfc3339())
        .bind(&usage.endpoint)
        .bind(&usage.method)
        .bind(usage.status_code as i64)
        .bind(usage.response_time_ms)
        .bind(usage.tokens_used)
        .bind(usage.cost_usd)
        .bind(&usage.ip_address)
        .bind(&usage.user_agent)
        .bind(&usage.error_code)
        .bind(&usage.error_message)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn get_by_key(
        &self,
        api_key_id: Uuid,
        limit: i64,
    ) -> Result<Vec<UsageRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM api_key_usage WHERE api_key_id = ?
             ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(api_key_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(rows.iter().map(usage_from_row).collect())
    }

    async fn get_by_organization(
        &self,
        organization_id: Uuid,
        limit: i64,
    ) -> Result<Vec<UsageRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM api_key_usage WHERE organization_id = ?
             ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(organization_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(rows.iter().map(usage_from_row).collect())
    }

    async fn get_summary(
        &self,
        organization_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<UsageSummary, StoreError> {
        let start = month_start(year, month).to_rfc3339();
        let end = next_month_start(year, month).to_rfc3339();
        let row = sqlx::query(
            "SELECT
                COUNT(*) AS total,
                SUM(CASE WHEN status_code >= 400 THEN 1 ELSE 0 END) AS errors,
                AVG(response_time_ms) AS avg_ms,
                SUM(tokens_used) AS tokens,
                SUM(cost_usd) AS cost
             FROM api_key_usage
             WHERE organization_id = ? AND timestamp >= ? AND timestamp < ?",
        )
        .bind(organization_id.to_string())
        .bind(&start)
        .bind(&end)
        .fetch_one(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(UsageSummary {
            organization_id,
            year,
            month,
            total_requests: row.get("total"),
            error_count: row.get::<Option<i64>, _>("errors").unwrap_or(0),
            avg_response_time_ms: row.get::<Option<f64>, _>("avg_ms").unwrap_or(0.0),
            total_tokens: row.get::<Option<i64>, _>("tokens").unwrap_or(0),
            total_cost_usd: row.get::<Option<f64>, _>("cost").unwrap_or(0.0),
        })
    }

    async fn get_monthly_usage(&self, organization_id: Uuid) -> Result<i64, StoreError> {
        let now = Utc::now();
        let start = month_start(now.year(), now.month()).to_rfc3339();
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM api_key_usage
             WHERE organization_id = ? AND timestamp >= ?",
        )
        .bind(organization_id.to_string())
        .bind(&start)
        .fetch_one(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(row.get("n"))
    }

    async fn get_endpoint_stats(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<EndpointStat>, StoreError> {
        let rows = sqlx::query(
            "SELECT endpoint, COUNT(*) AS n, AVG(response_time_ms) AS avg_ms
             FROM api_key_usage WHERE organization_id = ?
             GROUP BY endpoint ORDER BY n DESC",
        )
        .bind(organization_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(rows
            .iter()
            .map(|row| EndpointStat {
                endpoint: row.get("endpoint"),
                count: row.get("n"),
                avg_response_time_ms: row.get::<Option<f64>, _>("avg_ms").unwrap_or(0.0),
            })
            .collect())
    }

    async fn get_daily_stats(
        &self,
        organization_id: Uuid,
        days: i64,
    ) -> Result<Vec<DailyStat>, StoreError> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let rows = sqlx::query(
            "SELECT substr(timestamp, 1, 10) AS day, COUNT(*) AS n
             FROM api_key_usage WHERE organization_id = ? AND timestamp >= ?
             GROUP BY day ORDER BY day",
        )
        .bind(organization_id.to_string())
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(rows
            .iter()
            .map(|row| DailyStat {
                date: row.get("day"),
                count: row.get("n"),
            })
            .collect())
    }

    async fn get_error_stats(&self, organization_id: Uuid) -> Result<Vec<ErrorStat>, StoreError> {
        let rows = sqlx::query(
            "SELECT COALESCE(error_code, CAST(status_code AS TEXT)) AS code, COUNT(*) AS n
             FROM api_key_usage WHERE organization_id = ? AND status_code >= 400
             GROUP BY code ORDER BY n DESC",
        )
        .bind(organization_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(rows
            .iter()
            .map(|row| ErrorStat {
                error_code: row.get("code"),
                count: row.get("n"),
            })
            .collect())
    }

    async fn delete_old_records(&self, older_than_days: i64) -> Result<u64, StoreError> {
        let cutoff = (Utc::now() - Duration::days(older_than_days)).to_rfc3339();
        let result = sqlx::query("DELETE FROM api_key_usage WHERE timestamp < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected())
    }

    async fn get_top_consumers(&self, limit: i64) -> Result<Vec<(Uuid, i64)>, StoreError> {
        let rows = sqlx::query(
            "SELECT organization_id, COUNT(*) AS n FROM api_key_usage
             GROUP BY organization_id ORDER BY n DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(rows
            .iter()
            .map(|row| (parse_uuid(row.get("organization_id")), row.get("n")))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Organization;
    use switchyard_security::keygen;

    async fn store() -> SqliteAuthStore {
        SqliteAuthStore::new("sqlite::memory:").await.unwrap()
    }

    fn key_record(org: Uuid) -> ApiKeyRecord {
        let generated = keygen::generate(KeyEnvironment::Test);
        ApiKeyRecord {
            id: Uuid::new_v4(),
            organization_id: org,
            key_prefix: generated.key_prefix,
            key_hash: generated.key_hash,
            key_hint: generated.key_hint,
            name: "ci".into(),
            environment: KeyEnvironment::Test,
            scopes: vec!["*".into()],
            custom_rate_limit: None,
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
            expires_at: None,
            revoked_at: None,
            revoked_reason: None,
            revoked_by: None,
            description: None,
            total_requests: 0,
        }
    }

    #[tokio::test]
    async fn organization_roundtrip() {
        let store = store().await;
        let org = OrganizationStore::create(&store, Organization::new("Acme", "acme", "a@acme.io"))
            .await
            .unwrap();

        let loaded = OrganizationStore::get_by_id(&store, org.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.slug, "acme");
        assert_eq!(loaded.max_api_keys, 5);
        assert!(loaded.is_active);

        // Slug uniqueness enforced by the schema
        assert!(
            OrganizationStore::create(&store, Organization::new("Dup", "acme", "d@x.io"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn key_lookup_by_hash_and_revocation() {
        let store = store().await;
        let org = OrganizationStore::create(&store, Organization::new("Acme", "acme", "a@acme.io"))
            .await
            .unwrap();

        let key = ApiKeyStore::create(&store, key_record(org.id)).await.unwrap();
        let loaded = store.get_by_hash(&key.key_hash).await.unwrap().unwrap();
        assert_eq!(loaded.id, key.id);
        assert_eq!(loaded.scopes, vec!["*"]);

        assert!(store.revoke(key.id, "rotated", None).await.unwrap());
        let revoked = ApiKeyStore::get_by_id(&store, key.id).await.unwrap().unwrap();
        assert!(revoked.is_revoked());
        assert!(!revoked.is_active);
        let first_revoked_at = revoked.revoked_at;

        // Second revoke is a no-op on the timestamp
        assert!(store.revoke(key.id, "again", None).await.unwrap());
        let still = ApiKeyStore::get_by_id(&store, key.id).await.unwrap().unwrap();
        assert_eq!(still.revoked_at, first_revoked_at);
        assert_eq!(still.revoked_reason.as_deref(), Some("rotated"));

        assert!(!store.revoke(Uuid::new_v4(), "ghost", None).await.unwrap());
    }

    #[tokio::test]
    async fn active_count_and_filters() {
        let store = store().await;
        let org = OrganizationStore::create(&store, Organization::new("Acme", "acme", "a@acme.io"))
            .await
            .unwrap();

        let k1 = ApiKeyStore::create(&store, key_record(org.id)).await.unwrap();
        let _k2 = ApiKeyStore::create(&store, key_record(org.id)).await.unwrap();
        assert_eq!(store.get_active_count(org.id).await.unwrap(), 2);

        store.revoke(k1.id, "done", None).await.unwrap();
        assert_eq!(store.get_active_count(org.id).await.unwrap(), 1);

        let active_only = ApiKeyStore::get_by_organization(&store, org.id, Some(true), None)
            .await
            .unwrap();
        assert_eq!(active_only.len(), 1);

        let stats = store.get_statistics(org.id).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.revoked, 1);
    }

    #[tokio::test]
    async fn usage_summary_and_monthly_count() {
        let store = store().await;
        let org = Uuid::new_v4();
        let key = Uuid::new_v4();

        for status in [200, 200, 500] {
            UsageStore::create(
                &store,
                UsageRecord {
                    id: Uuid::new_v4(),
                    api_key_id: key,
                    organization_id: org,
                    timestamp: Utc::now(),
                    endpoint: "/".into(),
                    method: "POST".into(),
                    status_code: status,
                    response_time_ms: Some(10),
                    tokens_used: 5,
                    cost_usd: 0.001,
                    ip_address: None,
                    user_agent: Some("test".into()),
                    error_code: (status >= 400).then(|| "server_error".into()),
                    error_message: None,
                },
            )
            .await
            .unwrap();
        }

        assert_eq!(store.get_monthly_usage(org).await.unwrap(), 3);

        let now = Utc::now();
        let summary = store.get_summary(org, now.year(), now.month()).await.unwrap();
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.total_tokens, 15);

        let errors = store.get_error_stats(org).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_code, "server_error");

        let endpoints = store.get_endpoint_stats(org).await.unwrap();
        assert_eq!(endpoints[0].count, 3);

        let top = store.get_top_consumers(5).await.unwrap();
        assert_eq!(top[0], (org, 3));
    }
}
