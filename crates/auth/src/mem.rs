//! In-memory auth store — useful for testing and demo seeding.

use crate::models::{
    ApiKeyRecord, DailyStat, EndpointStat, ErrorStat, KeyStatistics, Organization, UsageRecord,
    UsageSummary,
};
use crate::repos::{
    ApiKeyStore, OrganizationStore, StoreError, UsageStore, month_start, next_month_start,
};
use async_trait::async_trait;
use chrono::{Datelike, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use switchyard_core::KeyEnvironment;
use uuid::Uuid;

/// One store implementing all three auth contracts over process memory.
#[derive(Default)]
pub struct MemoryAuthStore {
    orgs: RwLock<HashMap<Uuid, Organization>>,
    keys: RwLock<HashMap<Uuid, ApiKeyRecord>>,
    usage: RwLock<Vec<UsageRecord>>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrganizationStore for MemoryAuthStore {
    async fn create(&self, org: Organization) -> Result<Organization, StoreError> {
        let mut orgs = self.orgs.write().unwrap_or_else(|e| e.into_inner());
        if orgs.values().any(|o| o.slug == org.slug) {
            return Err(StoreError::Storage(format!(
                "slug already exists: {}",
                org.slug
            )));
        }
        orgs.insert(org.id, org.clone());
        Ok(org)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Organization>, StoreError> {
        Ok(self
            .orgs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned())
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Organization>, StoreError> {
        Ok(self
            .orgs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|o| o.slug == slug)
            .cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Organization>, StoreError> {
        Ok(self
            .orgs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|o| o.email == email)
            .cloned())
    }

    async fn get_all(
        &self,
        limit: i64,
        offset: i64,
        is_active: Option<bool>,
    ) -> Result<Vec<Organization>, StoreError> {
        let orgs = self.orgs.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<Organization> = orgs
            .values()
            .filter(|o| is_active.is_none_or(|active| o.is_active == active))
            .cloned()
            .collect();
        all.sort_by_key(|o| o.created_at);
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.orgs.read().unwrap_or_else(|e| e.into_inner()).len() as i64)
    }

    async fn update(&self, org: &Organization) -> Result<(), StoreError> {
        let mut orgs = self.orgs.write().unwrap_or_else(|e| e.into_inner());
        match orgs.get_mut(&org.id) {
            Some(existing) => {
                *existing = org.clone();
                Ok(())
            }
            None => Err(StoreError::Storage("organization not found".into())),
        }
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError> {
        let mut orgs = self.orgs.write().unwrap_or_else(|e| e.into_inner());
        Ok(orgs
            .get_mut(&id)
            .map(|o| {
                o.is_active = active;
            })
            .is_some())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let removed = self
            .orgs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some();
        if removed {
            // Cascade to keys and usage
            self.keys
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|_, k| k.organization_id != id);
            self.usage
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|u| u.organization_id != id);
        }
        Ok(removed)
    }

    async fn api_key_count(&self, id: Uuid) -> Result<u32, StoreError> {
        self.get_active_count(id).await
    }
}

#[async_trait]
impl ApiKeyStore for MemoryAuthStore {
    async fn create(&self, key: ApiKeyRecord) -> Result<ApiKeyRecord, StoreError> {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        if keys.values().any(|k| k.key_hash == key.key_hash) {
            return Err(StoreError::Storage("key hash already exists".into()));
        }
        keys.insert(key.id, key.clone());
        Ok(key)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ApiKeyRecord>, StoreError> {
        Ok(self
            .keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned())
    }

    async fn get_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, StoreError> {
        Ok(self
            .keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|k| k.key_hash == key_hash)
            .cloned())
    }

    async fn get_by_organization(
        &self,
        organization_id: Uuid,
        active: Option<bool>,
        environment: Option<KeyEnvironment>,
    ) -> Result<Vec<ApiKeyRecord>, StoreError> {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        let mut result: Vec<ApiKeyRecord> = keys
            .values()
            .filter(|k| k.organization_id == organization_id)
            .filter(|k| active.is_none_or(|a| k.is_active == a))
            .filter(|k| environment.is_none_or(|e| k.environment == e))
            .cloned()
            .collect();
        result.sort_by_key(|k| k.created_at);
        Ok(result)
    }

    async fn update_last_used(&self, id: Uuid) -> Result<(), StoreError> {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        if let Some(key) = keys.get_mut(&id) {
            key.last_used_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn increment_request_count(&self, id: Uuid) -> Result<(), StoreError> {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        if let Some(key) = keys.get_mut(&id) {
            key.total_requests += 1;
        }
        Ok(())
    }

    async fn revoke(
        &self,
        id: Uuid,
        reason: &str,
        revoked_by: Option<Uuid>,
    ) -> Result<bool, StoreError> {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        match keys.get_mut(&id) {
            Some(key) => {
                if key.revoked_at.is_none() {
                    key.revoked_at = Some(Utc::now());
                    key.revoked_reason = Some(reason.to_string());
                    key.revoked_by = revoked_by;
                    key.is_active = false;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_active_count(&self, organization_id: Uuid) -> Result<u32, StoreError> {
        Ok(self
            .keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|k| k.organization_id == organization_id && k.is_active && !k.is_revoked())
            .count() as u32)
    }

    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        let before = keys.len();
        keys.retain(|_, k| !k.is_expired());
        Ok((before - keys.len()) as u64)
    }

    async fn get_expiring_soon(&self, within_days: i64) -> Result<Vec<ApiKeyRecord>, StoreError> {
        let horizon = Utc::now() + Duration::days(within_days);
        Ok(self
            .keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|k| {
                k.is_active
                    && k.expires_at
                        .is_some_and(|at| at > Utc::now() && at <= horizon)
            })
            .cloned()
            .collect())
    }

    async fn get_unused(&self, for_days: i64) -> Result<Vec<ApiKeyRecord>, StoreError> {
        let cutoff = Utc::now() - Duration::days(for_days);
        Ok(self
            .keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|k| k.is_active && k.last_used_at.is_none_or(|at| at < cutoff))
            .cloned()
            .collect())
    }

    async fn get_statistics(&self, organization_id: Uuid) -> Result<KeyStatistics, StoreError> {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        let org_keys: Vec<&ApiKeyRecord> = keys
            .values()
            .filter(|k| k.organization_id == organization_id)
            .collect();
        Ok(KeyStatistics {
            total: org_keys.len() as i64,
            active: org_keys
                .iter()
                .filter(|k| k.is_active && !k.is_revoked() && !k.is_expired())
                .count() as i64,
            revoked: org_keys.iter().filter(|k| k.is_revoked()).count() as i64,
            expired: org_keys.iter().filter(|k| k.is_expired()).count() as i64,
        })
    }
}

#[async_trait]
impl UsageStore for MemoryAuthStore {
    async fn create(&self, usage: UsageRecord) -> Result<(), StoreError> {
        self.usage
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(usage);
        Ok(())
    }

    async fn get_by_key(
        &self,
        api_key_id: Uuid,
        limit: i64,
    ) -> Result<Vec<UsageRecord>, StoreError> {
        let usage = self.usage.read().unwrap_or_else(|e| e.into_inner());
        Ok(usage
            .iter()
            .rev()
            .filter(|u| u.api_key_id == api_key_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get_by_organization(
        &self,
        organization_id: Uuid,
        limit: i64,
    ) -> Result<Vec<UsageRecord>, StoreError> {
        let usage = self.usage.read().unwrap_or_else(|e| e.into_inner());
        Ok(usage
            .iter()
            .rev()
            .filter(|u| u.organization_id == organization_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get_summary(
        &self,
        organization_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<UsageSummary, StoreError> {
        let start = month_start(year, month);
        let end = next_month_start(year, month);
        let usage = self.usage.read().unwrap_or_else(|e| e.into_inner());

        let rows: Vec<&UsageRecord> = usage
            .iter()
            .filter(|u| {
                u.organization_id == organization_id && u.timestamp >= start && u.timestamp < end
            })
            .collect();

        let total_requests = rows.len() as i64;
        let error_count = rows.iter().filter(|u| u.status_code >= 400).count() as i64;
        let timed: Vec<i64> = rows.iter().filter_map(|u| u.response_time_ms).collect();
        let avg_response_time_ms = if timed.is_empty() {
            0.0
        } else {
            timed.iter().sum::<i64>() as f64 / timed.len() as f64
        };

        Ok(UsageSummary {
            organization_id,
            year,
            month,
            total_requests,
            error_count,
            avg_response_time_ms,
            total_tokens: rows.iter().map(|u| u.tokens_used).sum(),
            total_cost_usd: rows.iter().map(|u| u.cost_usd).sum(),
        })
    }

    async fn get_monthly_usage(&self, organization_id: Uuid) -> Result<i64, StoreError> {
        let now = Utc::now();
        let start = month_start(now.year(), now.month());
        Ok(self
            .usage
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|u| u.organization_id == organization_id && u.timestamp >= start)
            .count() as i64)
    }

    async fn get_endpoint_stats(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<EndpointStat>, StoreError> {
        let usage = self.usage.read().unwrap_or_else(|e| e.into_inner());
        let mut grouped: HashMap<String, (i64, i64, i64)> = HashMap::new();
        for row in usage.iter().filter(|u| u.organization_id == organization_id) {
            let entry = grouped.entry(row.endpoint.clone()).or_default();
            entry.0 += 1;
            if let Some(ms) = row.response_time_ms {
                entry.1 += ms;
                entry.2 += 1;
            }
        }
        let mut stats: Vec<EndpointStat> = grouped
            .into_iter()
            .map(|(endpoint, (count, total_ms, timed))| EndpointStat {
                endpoint,
                count,
                avg_response_time_ms: if timed == 0 {
                    0.0
                } else {
                    total_ms as f64 / timed as f64
                },
            })
            .collect();
        stats.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(stats)
    }

    async fn get_daily_stats(
        &self,
        organization_id: Uuid,
        days: i64,
    ) -> Result<Vec<DailyStat>, StoreError> {
        let cutoff = Utc::now() - Duration::days(days);
        let usage = self.usage.read().unwrap_or_else(|e| e.into_inner());
        let mut grouped: HashMap<String, i64> = HashMap::new();
        for row in usage
            .iter()
            .filter(|u| u.organization_id == organization_id && u.timestamp >= cutoff)
        {
            *grouped
                .entry(row.timestamp.format("%Y-%m-%d").to_string())
                .or_default() += 1;
        }
        let mut stats: Vec<DailyStat> = grouped
            .into_iter()
            .map(|(date, count)| DailyStat { date, count })
            .collect();
        stats.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(stats)
    }

    async fn get_error_stats(&self, organization_id: Uuid) -> Result<Vec<ErrorStat>, StoreError> {
        let usage = self.usage.read().unwrap_or_else(|e| e.into_inner());
        let mut grouped: HashMap<String, i64> = HashMap::new();
        for row in usage.iter().filter(|u| {
            u.organization_id == organization_id && u.status_code >= 400
        }) {
            let code = row
                .error_code
                .clone()
                .unwrap_or_else(|| row.status_code.to_string());
            *grouped.entry(code).or_default() += 1;
        }
        let mut stats: Vec<ErrorStat> = grouped
            .into_iter()
            .map(|(error_code, count)| ErrorStat { error_code, count })
            .collect();
        stats.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(stats)
    }

    async fn delete_old_records(&self, older_than_days: i64) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - Duration::days(older_than_days);
        let mut usage = self.usage.write().unwrap_or_else(|e| e.into_inner());
        let before = usage.len();
        usage.retain(|u| u.timestamp >= cutoff);
        Ok((before - usage.len()) as u64)
    }

    async fn get_top_consumers(&self, limit: i64) -> Result<Vec<(Uuid, i64)>, StoreError> {
        let usage = self.usage.read().unwrap_or_else(|e| e.into_inner());
        let mut grouped: HashMap<Uuid, i64> = HashMap::new();
        for row in usage.iter() {
            *grouped.entry(row.organization_id).or_default() += 1;
        }
        let mut consumers: Vec<(Uuid, i64)> = grouped.into_iter().collect();
        consumers.sort_by(|a, b| b.1.cmp(&a.1));
        consumers.truncate(limit.max(0) as usize);
        Ok(consumers)
    }
}
