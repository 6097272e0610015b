//! API-key authentication plane.
//!
//! [`ApiKeyService`] orchestrates key validation, creation, revocation, quota
//! checks, and usage accounting over three store traits (organizations, keys,
//! usage). Stores come in two flavors: in-memory for tests and demos, SQLite
//! for real deployments.

pub mod mem;
pub mod models;
pub mod repos;
pub mod service;
pub mod sqlite;

pub use mem::MemoryAuthStore;
pub use models::{
    ApiKeyRecord, CreatedKey, KeyStatistics, Organization, QuotaInfo, RedactedKey, UsageRecord,
    UsageSummary,
};
pub use repos::{ApiKeyStore, OrganizationStore, StoreError, UsageStore};
pub use service::{ApiKeyService, UsageEvent};
pub use sqlite::SqliteAuthStore;
