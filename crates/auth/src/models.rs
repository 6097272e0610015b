//! Persisted records for organizations, API keys, and usage accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchyard_core::KeyEnvironment;
use uuid::Uuid;

/// A tenant owning API keys and a monthly quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    /// Globally unique URL-safe identifier.
    pub slug: String,
    pub email: String,
    pub plan: String,
    pub is_active: bool,
    pub monthly_request_limit: i64,
    pub rate_limit_per_minute: u32,
    pub max_api_keys: u32,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: impl Into<String>, slug: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            slug: slug.into(),
            email: email.into(),
            plan: "free".into(),
            is_active: true,
            monthly_request_limit: 10_000,
            rate_limit_per_minute: 60,
            max_api_keys: 5,
            created_at: Utc::now(),
        }
    }
}

/// A stored API key. The plaintext never appears here; only the hash does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub key_prefix: String,
    /// Lowercase hex SHA-256 of the full key. Unique.
    pub key_hash: String,
    /// Last 4 characters of the token, for display.
    pub key_hint: String,
    pub name: String,
    pub environment: KeyEnvironment,
    pub scopes: Vec<String>,
    /// Overrides the organization's per-minute rate when set.
    pub custom_rate_limit: Option<u32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub revoked_by: Option<Uuid>,
    pub description: Option<String>,
    pub total_requests: i64,
}

impl ApiKeyRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at < Utc::now())
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// The list/admin view of a key. No hash, no plaintext.
#[derive(Debug, Clone, Serialize)]
pub struct RedactedKey {
    pub id: Uuid,
    pub name: String,
    pub key_hint: String,
    pub key_prefix: String,
    pub environment: KeyEnvironment,
    pub is_active: bool,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub total_requests: i64,
}

impl From<&ApiKeyRecord> for RedactedKey {
    fn from(key: &ApiKeyRecord) -> Self {
        Self {
            id: key.id,
            name: key.name.clone(),
            key_hint: key.key_hint.clone(),
            key_prefix: key.key_prefix.clone(),
            environment: key.environment,
            is_active: key.is_active,
            scopes: key.scopes.clone(),
            created_at: key.created_at,
            last_used_at: key.last_used_at,
            expires_at: key.expires_at,
            revoked_at: key.revoked_at,
            total_requests: key.total_requests,
        }
    }
}

/// Returned once from key creation. `full_key` is never stored.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedKey {
    pub id: Uuid,
    pub full_key: String,
    pub key_hint: String,
    pub key_prefix: String,
    pub name: String,
    pub environment: KeyEnvironment,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// One request's usage row. Immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub api_key_id: Uuid,
    pub organization_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub response_time_ms: Option<i64>,
    pub tokens_used: i64,
    pub cost_usd: f64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Monthly usage rollup for an organization.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub organization_id: Uuid,
    pub year: i32,
    pub month: u32,
    pub total_requests: i64,
    pub error_count: i64,
    pub avg_response_time_ms: f64,
    pub total_tokens: i64,
    pub total_cost_usd: f64,
}

/// Aggregate key counts for an organization.
#[derive(Debug, Clone, Serialize)]
pub struct KeyStatistics {
    pub total: i64,
    pub active: i64,
    pub revoked: i64,
    pub expired: i64,
}

/// Current-month quota position.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaInfo {
    pub current_usage: i64,
    pub quota: i64,
    pub remaining: i64,
    pub percentage_used: f64,
}

/// Per-endpoint usage rollup.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStat {
    pub endpoint: String,
    pub count: i64,
    pub avg_response_time_ms: f64,
}

/// Per-day request counts.
#[derive(Debug, Clone, Serialize)]
pub struct DailyStat {
    /// `YYYY-MM-DD`
    pub date: String,
    pub count: i64,
}

/// Per-error-code counts.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorStat {
    pub error_code: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organization_defaults() {
        let org = Organization::new("Acme", "acme", "ops@acme.io");
        assert!(org.is_active);
        assert_eq!(org.plan, "free");
        assert_eq!(org.max_api_keys, 5);
        assert!(org.monthly_request_limit > 0);
    }

    #[test]
    fn expiry_and_revocation_predicates() {
        let mut key = ApiKeyRecord {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            key_prefix: "pk_test_".into(),
            key_hash: "0".repeat(64),
            key_hint: "abcd".into(),
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
        };
        assert!(!key.is_expired());
        assert!(!key.is_revoked());

        key.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        assert!(key.is_expired());

        key.revoked_at = Some(Utc::now());
        assert!(key.is_revoked());
    }

    #[test]
    fn redacted_view_drops_hash() {
        let key = ApiKeyRecord {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            key_prefix: "pk_live_".into(),
            key_hash: "f".repeat(64),
            key_hint: "wxyz".into(),
            name: "prod".into(),
            environment: KeyEnvironment::Live,
            scopes: vec!["messages:send".into()],
            custom_rate_limit: Some(120),
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
            expires_at: None,
            revoked_at: None,
            revoked_reason: None,
            revoked_by: None,
            description: None,
            total_requests: 7,
        };
        let redacted = RedactedKey::from(&key);
        let json = serde_json::to_string(&redacted).unwrap();
        assert!(!json.contains(&key.key_hash));
        assert!(json.contains("wxyz"));
        assert!(json.contains("pk_live_"));
    }
}
