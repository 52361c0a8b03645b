//! Postgres repositories (sqlx). Schema lives in `migrations/`.

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
use crate::store::{
    AuditRepository, EntryRepository, KeyRepository, TenantRepository, UserRepository,
};

pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPool::connect(database_url).await?;
    Ok(pool)
}

/// Run pending migrations from the migrations/ directory.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ── Tenants ──────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgTenantRepository {
    pool: PgPool,
}

impl PgTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for PgTenantRepository {
    async fn insert(&self, tenant: &Tenant) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO tenants (id, name, email, phone, company_name, active, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.email)
        .bind(&tenant.phone)
        .bind(&tenant.company_name)
        .bind(tenant.active)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Tenant>> {
        let row = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list(&self) -> Result<Vec<Tenant>> {
        let rows =
            sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn update(&self, tenant: &Tenant) -> Result<()> {
        sqlx::query(
            r#"UPDATE tenants
               SET name = $2, email = $3, phone = $4, company_name = $5, active = $6, updated_at = $7
               WHERE id = $1"#,
        )
        .bind(tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.email)
        .bind(&tenant.phone)
        .bind(&tenant.company_name)
        .bind(tenant.active)
        .bind(tenant.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ── Access keys ──────────────────────────────────────────────

#[derive(Clone)]
pub struct PgKeyRepository {
    pool: PgPool,
}

impl PgKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyRepository for PgKeyRepository {
    async fn insert(&self, key: &AccessKey) -> Result<bool> {
        let result = sqlx::query(
            r#"INSERT INTO access_keys (
                   id, code, tenant_id, client_name, client_email, client_phone,
                   company_name, status, expires_at, revoked_at, revoked_reason,
                   last_validated_at, device_id, observations, created_at, updated_at
               )
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
               ON CONFLICT (code) DO NOTHING"#,
        )
        .bind(key.id)
        .bind(&key.code)
        .bind(key.tenant_id)
        .bind(&key.client_name)
        .bind(&key.client_email)
        .bind(&key.client_phone)
        .bind(&key.company_name)
        .bind(key.status)
        .bind(key.expires_at)
        .bind(key.revoked_at)
        .bind(&key.revoked_reason)
        .bind(key.last_validated_at)
        .bind(&key.device_id)
        .bind(&key.observations)
        .bind(key.created_at)
        .bind(key.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, id: Uuid) -> Result<Option<AccessKey>> {
        let row = sqlx::query_as::<_, AccessKey>("SELECT * FROM access_keys WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<AccessKey>> {
        let row =
            sqlx::query_as::<_, AccessKey>("SELECT * FROM access_keys WHERE code = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn list(&self) -> Result<Vec<AccessKey>> {
        let rows = sqlx::query_as::<_, AccessKey>(
            "SELECT * FROM access_keys ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update(&self, key: &AccessKey) -> Result<()> {
        sqlx::query(
            r#"UPDATE access_keys
               SET client_name = $2, client_email = $3, client_phone = $4,
                   company_name = $5, status = $6, expires_at = $7, revoked_at = $8,
                   revoked_reason = $9, observations = $10, updated_at = $11
               WHERE id = $1"#,
        )
        .bind(key.id)
        .bind(&key.client_name)
        .bind(&key.client_email)
        .bind(&key.client_phone)
        .bind(&key.company_name)
        .bind(key.status)
        .bind(key.expires_at)
        .bind(key.revoked_at)
        .bind(&key.revoked_reason)
        .bind(&key.observations)
        .bind(key.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch_validation(
        &self,
        id: Uuid,
        device_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE access_keys
               SET device_id = $2, last_validated_at = $3, updated_at = $3
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(device_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_for_tenant(
        &self,
        tenant_id: Uuid,
        status: Option<KeyStatus>,
    ) -> Result<i64> {
        let count = match status {
            Some(status) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM access_keys WHERE tenant_id = $1 AND status = $2",
                )
                .bind(tenant_id)
                .bind(status)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM access_keys WHERE tenant_id = $1",
                )
                .bind(tenant_id)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(count)
    }

    async fn bind_user(&self, key_id: Uuid, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO access_key_users (access_key_id, user_id)
               VALUES ($1, $2)
               ON CONFLICT DO NOTHING"#,
        )
        .bind(key_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unbind_user(&self, key_id: Uuid, user_id: Uuid) -> Result<()> {
        sqlx::query(
            "DELETE FROM access_key_users WHERE access_key_id = $1 AND user_id = $2",
        )
        .bind(key_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn users_for_key(&self, key_id: Uuid) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(
            r#"SELECT u.* FROM users u
               JOIN access_key_users aku ON aku.user_id = u.id
               WHERE aku.access_key_id = $1
               ORDER BY u.created_at ASC"#,
        )
        .bind(key_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn keys_for_user(&self, user_id: Uuid) -> Result<Vec<AccessKey>> {
        let rows = sqlx::query_as::<_, AccessKey>(
            r#"SELECT k.* FROM access_keys k
               JOIN access_key_users aku ON aku.access_key_id = k.id
               WHERE aku.user_id = $1
               ORDER BY k.created_at ASC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// ── Users ────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn insert(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO users (id, name, handle, password_hash, phone, role, active, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.handle)
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(user.role)
        .bind(user.active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>("SELECT * FROM users WHERE handle = $1")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool> {
        let result =
            sqlx::query("UPDATE users SET active = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(active)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ── Validation audit log ─────────────────────────────────────

#[derive(Clone)]
pub struct PgAuditRepository {
    pool: PgPool,
}

impl PgAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for PgAuditRepository {
    async fn append(&self, entry: &ValidationLogEntry) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO validation_logs (id, access_key_id, device_id, outcome, app_version, os_version, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(entry.id)
        .bind(entry.access_key_id)
        .bind(&entry.device_id)
        .bind(entry.outcome)
        .bind(&entry.app_version)
        .bind(&entry.os_version)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_for(&self, key_id: Uuid, limit: i64) -> Result<Vec<ValidationLogEntry>> {
        let rows = sqlx::query_as::<_, ValidationLogEntry>(
            r#"SELECT * FROM validation_logs
               WHERE access_key_id = $1
               ORDER BY created_at DESC
               LIMIT $2"#,
        )
        .bind(key_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// ── Vehicle entries ──────────────────────────────────────────

#[derive(Clone)]
pub struct PgEntryRepository {
    pool: PgPool,
}

impl PgEntryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntryRepository for PgEntryRepository {
    async fn insert(&self, entry: &VehicleEntry) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO vehicle_entries (id, tenant_id, plate, client_name, spot_number, status, entry_time, exit_time, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(entry.id)
        .bind(entry.tenant_id)
        .bind(&entry.plate)
        .bind(&entry.client_name)
        .bind(&entry.spot_number)
        .bind(entry.status)
        .bind(entry.entry_time)
        .bind(entry.exit_time)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_entries_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM vehicle_entries
               WHERE tenant_id = $1 AND entry_time >= $2 AND entry_time < $3"#,
        )
        .bind(tenant_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_exits_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM vehicle_entries
               WHERE tenant_id = $1 AND exit_time >= $2 AND exit_time < $3"#,
        )
        .bind(tenant_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_parked(&self, tenant_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM vehicle_entries WHERE tenant_id = $1 AND status = 'parked'",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn entries_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<VehicleEntry>> {
        let rows = sqlx::query_as::<_, VehicleEntry>(
            r#"SELECT * FROM vehicle_entries
               WHERE tenant_id = $1 AND entry_time >= $2 AND entry_time < $3
               ORDER BY entry_time ASC"#,
        )
        .bind(tenant_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn exits_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<VehicleEntry>> {
        let rows = sqlx::query_as::<_, VehicleEntry>(
            r#"SELECT * FROM vehicle_entries
               WHERE tenant_id = $1 AND exit_time >= $2 AND exit_time < $3
               ORDER BY exit_time ASC"#,
        )
        .bind(tenant_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn recent_entries_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<VehicleEntry>> {
        let rows = sqlx::query_as::<_, VehicleEntry>(
            r#"SELECT * FROM vehicle_entries
               WHERE tenant_id = $1 AND entry_time >= $2 AND entry_time < $3
               ORDER BY entry_time DESC
               LIMIT $4"#,
        )
        .bind(tenant_id)
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn parked(&self, tenant_id: Uuid) -> Result<Vec<VehicleEntry>> {
        let rows = sqlx::query_as::<_, VehicleEntry>(
            r#"SELECT * FROM vehicle_entries
               WHERE tenant_id = $1 AND status = 'parked'
               ORDER BY entry_time DESC"#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn entry_time_span(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let row = sqlx::query_as::<_, (Option<DateTime<Utc>>, Option<DateTime<Utc>>)>(
            "SELECT MIN(entry_time), MAX(entry_time) FROM vehicle_entries WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(match row {
            (Some(first), Some(last)) => Some((first, last)),
            _ => None,
        })
    }
}
