//! Persistence layer — one repository trait per entity, injected at
//! construction time so tests can substitute the in-memory backend.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::audit::ValidationLogEntry;
use crate::models::entry::VehicleEntry;
use crate::models::key::{AccessKey, KeyStatus};
use crate::models::tenant::Tenant;
use crate::models::user::User;

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn insert(&self, tenant: &Tenant) -> Result<()>;
    async fn find(&self, id: Uuid) -> Result<Option<Tenant>>;
    async fn list(&self) -> Result<Vec<Tenant>>;
    async fn update(&self, tenant: &Tenant) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// Inserts the key, relying on the storage-level uniqueness of `code`.
    /// Returns `false` (store unchanged) when the code is already taken.
    async fn insert(&self, key: &AccessKey) -> Result<bool>;
    async fn find(&self, id: Uuid) -> Result<Option<AccessKey>>;
    async fn find_by_code(&self, code: &str) -> Result<Option<AccessKey>>;
    /// All keys, newest-first.
    async fn list(&self) -> Result<Vec<AccessKey>>;
    async fn update(&self, key: &AccessKey) -> Result<()>;
    /// Single-row update of the validation metadata. Concurrent
    /// validations of one key are last-writer-wins.
    async fn touch_validation(
        &self,
        id: Uuid,
        device_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()>;
    async fn count_for_tenant(
        &self,
        tenant_id: Uuid,
        status: Option<KeyStatus>,
    ) -> Result<i64>;
    async fn bind_user(&self, key_id: Uuid, user_id: Uuid) -> Result<()>;
    async fn unbind_user(&self, key_id: Uuid, user_id: Uuid) -> Result<()>;
    async fn users_for_key(&self, key_id: Uuid) -> Result<Vec<User>>;
    async fn keys_for_user(&self, user_id: Uuid) -> Result<Vec<AccessKey>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> Result<()>;
    async fn find(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_by_handle(&self, handle: &str) -> Result<Option<User>>;
    async fn list(&self) -> Result<Vec<User>>;
    /// Returns `false` when no such user exists.
    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool>;
}

/// Append-only by contract: no update or delete is exposed.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, entry: &ValidationLogEntry) -> Result<()>;
    /// Entries for one key, newest-first.
    async fn recent_for(&self, key_id: Uuid, limit: i64) -> Result<Vec<ValidationLogEntry>>;
}

/// Read interface over vehicle-entry history. The entry/exit CRUD itself
/// belongs to another subsystem; everything here is tenant-scoped.
#[async_trait]
pub trait EntryRepository: Send + Sync {
    async fn insert(&self, entry: &VehicleEntry) -> Result<()>;
    async fn count_entries_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64>;
    async fn count_exits_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64>;
    async fn count_parked(&self, tenant_id: Uuid) -> Result<i64>;
    /// Rows with entry time in `[start, end)`.
    async fn entries_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<VehicleEntry>>;
    /// Rows with exit time in `[start, end)`.
    async fn exits_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<VehicleEntry>>;
    /// Rows with entry time in `[start, end)`, entry time descending,
    /// at most `limit`.
    async fn recent_entries_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<VehicleEntry>>;
    async fn parked(&self, tenant_id: Uuid) -> Result<Vec<VehicleEntry>>;
    /// Earliest and latest entry timestamps for the tenant, `None` when
    /// the tenant has no history at all.
    async fn entry_time_span(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>>;
}

/// Injected repository bundle. Handlers and services hold these trait
/// objects; nothing in the crate reaches for a global client.
#[derive(Clone)]
pub struct Stores {
    pub tenants: Arc<dyn TenantRepository>,
    pub keys: Arc<dyn KeyRepository>,
    pub users: Arc<dyn UserRepository>,
    pub audit: Arc<dyn AuditRepository>,
    pub entries: Arc<dyn EntryRepository>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            tenants: Arc::new(postgres::PgTenantRepository::new(pool.clone())),
            keys: Arc::new(postgres::PgKeyRepository::new(pool.clone())),
            users: Arc::new(postgres::PgUserRepository::new(pool.clone())),
            audit: Arc::new(postgres::PgAuditRepository::new(pool.clone())),
            entries: Arc::new(postgres::PgEntryRepository::new(pool)),
        }
    }

    pub fn memory() -> Self {
        let backend = Arc::new(memory::MemoryBackend::default());
        Self {
            tenants: backend.clone(),
            keys: backend.clone(),
            users: backend.clone(),
            audit: backend.clone(),
            entries: backend,
        }
    }
}
