//! The API-key service — validation, lifecycle, quotas, scopes, usage.
//!
//! This is the layer the gateway middleware talks to. Every failure path is
//! a typed [`AuthError`] carrying a fixed machine code and HTTP status;
//! security-relevant outcomes are mirrored to the audit log.

use crate::models::{
    ApiKeyRecord, CreatedKey, Organization, QuotaInfo, RedactedKey, UsageRecord, UsageSummary,
};
use crate::repos::{ApiKeyStore, OrganizationStore, StoreError, UsageStore};
use chrono::{Duration, Utc};
use std::sync::Arc;
use switchyard_core::{AuthContext, AuthError, KeyEnvironment};
use switchyard_security::{AuditLog, AuditSeverity, keygen};
use tracing::warn;
use uuid::Uuid;

/// Usage details recorded after a request completes.
#[derive(Debug, Clone, Default)]
pub struct UsageEvent {
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

/// Orchestrates key validation, creation, revocation, and accounting.
pub struct ApiKeyService {
    orgs: Arc<dyn OrganizationStore>,
    keys: Arc<dyn ApiKeyStore>,
    usage: Arc<dyn UsageStore>,
    audit: Option<Arc<AuditLog>>,
}

impl ApiKeyService {
    pub fn new(
        orgs: Arc<dyn OrganizationStore>,
        keys: Arc<dyn ApiKeyStore>,
        usage: Arc<dyn UsageStore>,
    ) -> Self {
        Self {
            orgs,
            keys,
            usage,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    fn audit_security(&self, event: &str, detail: &str, severity: AuditSeverity) {
        if let Some(audit) = &self.audit {
            audit.record(event, severity, None, serde_json::json!({ "detail": detail }));
        }
    }

    /// Validate a plaintext key and derive the request's [`AuthContext`].
    pub async fn validate(&self, api_key: &str) -> Result<AuthContext, AuthError> {
        if !keygen::validate_format(api_key) {
            self.audit_security(
                "api_key_invalid_format",
                "Invalid API key format",
                AuditSeverity::Warning,
            );
            return Err(AuthError::InvalidApiKey("Invalid API key format".into()));
        }

        let key_hash = keygen::hash_key(api_key);
        let key = self
            .keys
            .get_by_hash(&key_hash)
            .await
            .map_err(store_error)?
            .ok_or_else(|| {
                self.audit_security(
                    "api_key_not_found",
                    "API key not found",
                    AuditSeverity::Warning,
                );
                AuthError::InvalidApiKey("Invalid API key".into())
            })?;

        if let Some(revoked_at) = key.revoked_at {
            self.audit_security(
                "api_key_revoked",
                &format!("Revoked API key used: {}", key.id),
                AuditSeverity::Warning,
            );
            return Err(AuthError::RevokedApiKey {
                revoked_at: revoked_at.to_rfc3339(),
                reason: key.revoked_reason.clone(),
            });
        }

        if !key.is_active {
            self.audit_security(
                "api_key_inactive",
                &format!("Inactive API key used: {}", key.id),
                AuditSeverity::Warning,
            );
            return Err(AuthError::InvalidApiKey("API key is inactive".into()));
        }

        if let Some(expires_at) = key.expires_at {
            if expires_at < Utc::now() {
                self.audit_security(
                    "api_key_expired",
                    &format!("Expired API key used: {}", key.id),
                    AuditSeverity::Warning,
                );
                return Err(AuthError::ExpiredApiKey {
                    expires_at: expires_at.to_rfc3339(),
                });
            }
        }

        let organization = self
            .orgs
            .get_by_id(key.organization_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| AuthError::InvalidApiKey("Organization not found".into()))?;

        if !organization.is_active {
            self.audit_security(
                "organization_inactive",
                &format!("Inactive organization: {}", organization.id),
                AuditSeverity::Warning,
            );
            return Err(AuthError::OrganizationInactive);
        }

        if let Err(e) = self.keys.update_last_used(key.id).await {
            warn!(key = %key.id, error = %e, "Failed to touch last_used_at");
        }

        self.audit_security(
            "api_key_authenticated",
            &format!("API key authenticated: {}", key.id),
            AuditSeverity::Info,
        );

        Ok(AuthContext {
            key_id: key.id,
            organization_id: organization.id,
            scopes: key.scopes.clone(),
            rate_limit: key
                .custom_rate_limit
                .unwrap_or(organization.rate_limit_per_minute),
            environment: key.environment,
            monthly_limit: organization.monthly_request_limit,
        })
    }

    /// Create a key for an organization. The plaintext is returned once and
    /// never stored.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_key(
        &self,
        org_id: Uuid,
        name: &str,
        environment: KeyEnvironment,
        description: Option<String>,
        scopes: Option<Vec<String>>,
        custom_rate_limit: Option<u32>,
        expires_in_days: Option<i64>,
    ) -> Result<CreatedKey, AuthError> {
        let organization = self
            .orgs
            .get_by_id(org_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| AuthError::InvalidApiKey("Organization not found".into()))?;

        if !organization.is_active {
            return Err(AuthError::OrganizationInactive);
        }

        if !self
            .orgs
            .can_create_api_key(org_id)
            .await
            .map_err(store_error)?
        {
            let current = self.orgs.api_key_count(org_id).await.map_err(store_error)?;
            return Err(AuthError::KeyLimitExceeded {
                current,
                max: organization.max_api_keys,
            });
        }

        let generated = keygen::generate(environment);
        let record = ApiKeyRecord {
            id: Uuid::new_v4(),
            organization_id: org_id,
            key_prefix: generated.key_prefix.clone(),
            key_hash: generated.key_hash.clone(),
            key_hint: generated.key_hint.clone(),
            name: name.to_string(),
            environment,
            scopes: scopes.unwrap_or_else(|| vec!["*".into()]),
            custom_rate_limit,
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
            expires_at: expires_in_days.map(|days| Utc::now() + Duration::days(days)),
            revoked_at: None,
            revoked_reason: None,
            revoked_by: None,
            description,
            total_requests: 0,
        };

        let stored = self.keys.create(record).await.map_err(|e| {
            self.audit_security(
                "api_key_storage_failed",
                &format!("Failed to store API key: {e}"),
                AuditSeverity::Error,
            );
            AuthError::Storage(e.to_string())
        })?;

        self.audit_security(
            "api_key_created",
            &format!("API key created: {} for org: {org_id}", stored.id),
            AuditSeverity::Info,
        );

        Ok(CreatedKey {
            id: stored.id,
            full_key: generated.full_key,
            key_hint: stored.key_hint,
            key_prefix: stored.key_prefix,
            name: stored.name,
            environment: stored.environment,
            scopes: stored.scopes,
            created_at: stored.created_at,
            expires_at: stored.expires_at,
        })
    }

    /// Revoke a key. Idempotent: revoking an already-revoked key succeeds
    /// without changing `revoked_at`.
    pub async fn revoke_key(
        &self,
        key_id: Uuid,
        reason: &str,
        revoked_by: Option<Uuid>,
    ) -> Result<(), AuthError> {
        let found = self
            .keys
            .revoke(key_id, reason, revoked_by)
            .await
            .map_err(store_error)?;
        if !found {
            return Err(AuthError::InvalidApiKey("API key not found".into()));
        }

        self.audit_security(
            "api_key_revoked",
            &format!("API key revoked: {key_id}. Reason: {reason}"),
            AuditSeverity::Info,
        );
        Ok(())
    }

    /// Redacted key list for an organization. Never returns plaintext.
    pub async fn list_keys(&self, org_id: Uuid) -> Result<Vec<RedactedKey>, AuthError> {
        let keys = self
            .keys
            .get_by_organization(org_id, None, None)
            .await
            .map_err(store_error)?;
        Ok(keys.iter().map(RedactedKey::from).collect())
    }

    /// Current-month quota check. Errors with `monthly_quota_exceeded` when
    /// usage has reached the organization's limit.
    pub async fn check_monthly_quota(&self, org_id: Uuid) -> Result<QuotaInfo, AuthError> {
        let organization = self
            .orgs
            .get_by_id(org_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| AuthError::InvalidApiKey("Organization not found".into()))?;

        let current_usage = self
            .usage
            .get_monthly_usage(org_id)
            .await
            .map_err(store_error)?;
        let quota = organization.monthly_request_limit;

        if current_usage >= quota {
            return Err(AuthError::MonthlyQuotaExceeded {
                used: current_usage,
                quota,
            });
        }

        Ok(QuotaInfo {
            current_usage,
            quota,
            remaining: quota - current_usage,
            percentage_used: if quota > 0 {
                current_usage as f64 / quota as f64 * 100.0
            } else {
                0.0
            },
        })
    }

    /// A wildcard scope satisfies any requirement; otherwise the required
    /// scope must be present.
    pub fn check_scope(scopes: &[String], required: &str) -> Result<(), AuthError> {
        if scopes.iter().any(|s| s == "*" || s == required) {
            return Ok(());
        }
        Err(AuthError::InsufficientScope {
            required: required.to_string(),
            available: scopes.to_vec(),
        })
    }

    /// At least one of the required scopes must be satisfied.
    pub fn check_any_scope(scopes: &[String], required: &[&str]) -> Result<(), AuthError> {
        if required.iter().any(|r| Self::check_scope(scopes, r).is_ok()) {
            return Ok(());
        }
        Err(AuthError::InsufficientScope {
            required: required.join(" | "),
            available: scopes.to_vec(),
        })
    }

    /// Every required scope must be satisfied.
    pub fn check_all_scopes(scopes: &[String], required: &[&str]) -> Result<(), AuthError> {
        for r in required {
            Self::check_scope(scopes, r)?;
        }
        Ok(())
    }

    /// Append a usage row and bump the key's request counter.
    pub async fn track_usage(
        &self,
        key_id: Uuid,
        org_id: Uuid,
        event: UsageEvent,
    ) -> Result<(), AuthError> {
        self.usage
            .create(UsageRecord {
                id: Uuid::new_v4(),
                api_key_id: key_id,
                organization_id: org_id,
                timestamp: Utc::now(),
                endpoint: event.endpoint,
                method: event.method,
                status_code: event.status_code,
                response_time_ms: event.response_time_ms,
                tokens_used: event.tokens_used,
                cost_usd: event.cost_usd,
                ip_address: event.ip_address,
                user_agent: event.user_agent,
                error_code: event.error_code,
                error_message: event.error_message,
            })
            .await
            .map_err(store_error)?;

        self.keys
            .increment_request_count(key_id)
            .await
            .map_err(store_error)
    }

    /// Monthly usage rollup for the admin surface.
    pub async fn usage_summary(
        &self,
        org_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<UsageSummary, AuthError> {
        self.usage
            .get_summary(org_id, year, month)
            .await
            .map_err(store_error)
    }

    pub fn organizations(&self) -> &Arc<dyn OrganizationStore> {
        &self.orgs
    }

    pub fn api_keys(&self) -> &Arc<dyn ApiKeyStore> {
        &self.keys
    }

    pub fn usage_store(&self) -> &Arc<dyn UsageStore> {
        &self.usage
    }

    /// Seed a known plaintext key (demo/dev bootstrapping). Creates the
    /// organization when missing and stores the key hash directly.
    pub async fn seed_plaintext_key(
        &self,
        plaintext: &str,
        org_slug: &str,
    ) -> Result<Option<Uuid>, AuthError> {
        if !keygen::validate_format(plaintext) {
            return Err(AuthError::InvalidApiKey("Invalid API key format".into()));
        }
        let key_hash = keygen::hash_key(plaintext);
        if self
            .keys
            .get_by_hash(&key_hash)
            .await
            .map_err(store_error)?
            .is_some()
        {
            return Ok(None);
        }

        let organization = match self
            .orgs
            .get_by_slug(org_slug)
            .await
            .map_err(store_error)?
        {
            Some(org) => org,
            None => self
                .orgs
                .create(Organization::new(org_slug, org_slug, format!("{org_slug}@localhost")))
                .await
                .map_err(store_error)?,
        };

        let environment = keygen::extract_environment(plaintext).unwrap_or(KeyEnvironment::Test);
        let token_tail: String = plaintext.chars().rev().take(4).collect();
        let record = ApiKeyRecord {
            id: Uuid::new_v4(),
            organization_id: organization.id,
            key_prefix: keygen::extract_prefix(plaintext).unwrap_or_default(),
            key_hash,
            key_hint: token_tail.chars().rev().collect(),
            name: "demo".into(),
            environment,
            scopes: vec!["*".into()],
            custom_rate_limit: None,
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
            expires_at: None,
            revoked_at: None,
            revoked_reason: None,
            revoked_by: None,
            description: Some("Seeded demo key".into()),
            total_requests: 0,
        };
        let stored = self.keys.create(record).await.map_err(store_error)?;
        Ok(Some(stored.id))
    }
}

fn store_error(e: StoreError) -> AuthError {
    AuthError::Storage(e.to_string())
}
