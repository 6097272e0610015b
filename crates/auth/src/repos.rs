//! Store traits for the authentication plane.
//!
//! These are the persistence contracts the service layer consumes. Every
//! method is async and returns [`StoreError`] so implementations can sit on
//! SQLite, Postgres, or plain memory.

use crate::models::{
    ApiKeyRecord, DailyStat, EndpointStat, ErrorStat, KeyStatistics, Organization, UsageRecord,
    UsageSummary,
};
use async_trait::async_trait;
use switchyard_core::KeyEnvironment;
use thiserror::Error;
use uuid::Uuid;

/// Errors from a backing store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Organization persistence.
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn create(&self, org: Organization) -> Result<Organization, StoreError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Organization>, StoreError>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Organization>, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<Organization>, StoreError>;
    async fn get_all(
        &self,
        limit: i64,
        offset: i64,
        is_active: Option<bool>,
    ) -> Result<Vec<Organization>, StoreError>;
    async fn count(&self) -> Result<i64, StoreError>;
    async fn update(&self, org: &Organization) -> Result<(), StoreError>;
    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Active (non-revoked) key count for the organization.
    async fn api_key_count(&self, id: Uuid) -> Result<u32, StoreError>;

    async fn activate(&self, id: Uuid) -> Result<bool, StoreError> {
        self.set_active(id, true).await
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, StoreError> {
        self.set_active(id, false).await
    }

    /// Whether the organization is below its `max_api_keys` limit.
    async fn can_create_api_key(&self, id: Uuid) -> Result<bool, StoreError> {
        let Some(org) = self.get_by_id(id).await? else {
            return Ok(false);
        };
        Ok(self.api_key_count(id).await? < org.max_api_keys)
    }
}

/// API-key persistence.
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn create(&self, key: ApiKeyRecord) -> Result<ApiKeyRecord, StoreError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<ApiKeyRecord>, StoreError>;
    async fn get_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, StoreError>;
    async fn get_by_organization(
        &self,
        organization_id: Uuid,
        active: Option<bool>,
        environment: Option<KeyEnvironment>,
    ) -> Result<Vec<ApiKeyRecord>, StoreError>;
    async fn update_last_used(&self, id: Uuid) -> Result<(), StoreError>;
    async fn increment_request_count(&self, id: Uuid) -> Result<(), StoreError>;
    /// Revoke a key. Returns `false` when the key does not exist. Revoking an
    /// already-revoked key is a no-op that reports success.
    async fn revoke(
        &self,
        id: Uuid,
        reason: &str,
        revoked_by: Option<Uuid>,
    ) -> Result<bool, StoreError>;
    async fn get_active_count(&self, organization_id: Uuid) -> Result<u32, StoreError>;
    /// Hard-delete keys whose expiry has passed. Returns how many were removed.
    async fn delete_expired(&self) -> Result<u64, StoreError>;
    async fn get_expiring_soon(&self, within_days: i64) -> Result<Vec<ApiKeyRecord>, StoreError>;
    /// Keys never used, or not used for `for_days` days.
    async fn get_unused(&self, for_days: i64) -> Result<Vec<ApiKeyRecord>, StoreError>;
    async fn get_statistics(&self, organization_id: Uuid) -> Result<KeyStatistics, StoreError>;
}

/// Usage-row persistence. Rows are immutable after insert.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn create(&self, usage: UsageRecord) -> Result<(), StoreError>;
    async fn get_by_key(&self, api_key_id: Uuid, limit: i64) -> Result<Vec<UsageRecord>, StoreError>;
    async fn get_by_organization(
        &self,
        organization_id: Uuid,
        limit: i64,
    ) -> Result<Vec<UsageRecord>, StoreError>;
    async fn get_summary(
        &self,
        organization_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<UsageSummary, StoreError>;
    /// Request count in the current calendar month.
    async fn get_monthly_usage(&self, organization_id: Uuid) -> Result<i64, StoreError>;
    async fn get_endpoint_stats(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<EndpointStat>, StoreError>;
    async fn get_daily_stats(
        &self,
        organization_id: Uuid,
        days: i64,
    ) -> Result<Vec<DailyStat>, StoreError>;
    async fn get_error_stats(&self, organization_id: Uuid) -> Result<Vec<ErrorStat>, StoreError>;
    /// Purge rows older than the retention window. Returns how many were removed.
    async fn delete_old_records(&self, older_than_days: i64) -> Result<u64, StoreError>;
    /// Organizations by request volume, descending.
    async fn get_top_consumers(&self, limit: i64) -> Result<Vec<(Uuid, i64)>, StoreError>;
}

/// First instant of a calendar month, UTC.
pub(crate) fn month_start(year: i32, month: u32) -> chrono::DateTime<chrono::Utc> {
    chrono::NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap_or_else(|| chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// First instant of the month after `(year, month)`, UTC.
pub(crate) fn next_month_start(year: i32, month: u32) -> chrono::DateTime<chrono::Utc> {
    if month == 12 {
        month_start(year + 1, 1)
    } else {
        month_start(year, month + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_bounds() {
        let start = month_start(2026, 2);
        let end = next_month_start(2026, 2);
        assert_eq!(start.to_rfc3339(), "2026-02-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2026-03-01T00:00:00+00:00");

        let december = next_month_start(2026, 12);
        assert_eq!(december.to_rfc3339(), "2027-01-01T00:00:00+00:00");
    }
}
