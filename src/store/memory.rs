//! In-memory backend mirroring the Postgres repositories. Used by the
//! test suites; behavior (ordering, limits, uniqueness) matches the SQL
//! implementation.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::audit::ValidationLogEntry;
use crate::models::entry::{EntryStatus, VehicleEntry};
use crate::models::key::{AccessKey, KeyStatus};
use crate::models::tenant::Tenant;
use crate::models::user::User;
use crate::store::{
    AuditRepository, EntryRepository, KeyRepository, TenantRepository, UserRepository,
};

/// One shared backend implements all five repository traits.
#[derive(Default)]
pub struct MemoryBackend {
    tenants: DashMap<Uuid, Tenant>,
    keys: DashMap<Uuid, AccessKey>,
    users: DashMap<Uuid, User>,
    bindings: DashMap<(Uuid, Uuid), ()>,
    logs: Mutex<Vec<ValidationLogEntry>>,
    entries: DashMap<Uuid, VehicleEntry>,
}

impl MemoryBackend {
    /// Total audit rows, including sentinel rows for unresolvable codes
    /// that `recent_for` cannot address by key id. Test support.
    pub fn validation_log_count(&self) -> usize {
        self.logs.lock().expect("audit log lock poisoned").len()
    }
}

#[async_trait]
impl TenantRepository for MemoryBackend {
    async fn insert(&self, tenant: &Tenant) -> Result<()> {
        self.tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Tenant>> {
        Ok(self.tenants.get(&id).map(|t| t.clone()))
    }

    async fn list(&self) -> Result<Vec<Tenant>> {
        let mut rows: Vec<Tenant> = self.tenants.iter().map(|t| t.clone()).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn update(&self, tenant: &Tenant) -> Result<()> {
        self.tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.tenants.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl KeyRepository for MemoryBackend {
    async fn insert(&self, key: &AccessKey) -> Result<bool> {
        if self.keys.iter().any(|k| k.code == key.code) {
            return Ok(false);
        }
        self.keys.insert(key.id, key.clone());
        Ok(true)
    }

    async fn find(&self, id: Uuid) -> Result<Option<AccessKey>> {
        Ok(self.keys.get(&id).map(|k| k.clone()))
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<AccessKey>> {
        Ok(self.keys.iter().find(|k| k.code == code).map(|k| k.clone()))
    }

    async fn list(&self) -> Result<Vec<AccessKey>> {
        let mut rows: Vec<AccessKey> = self.keys.iter().map(|k| k.clone()).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn update(&self, key: &AccessKey) -> Result<()> {
        self.keys.insert(key.id, key.clone());
        Ok(())
    }

    async fn touch_validation(
        &self,
        id: Uuid,
        device_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(mut key) = self.keys.get_mut(&id) {
            key.device_id = device_id.map(String::from);
            key.last_validated_at = Some(at);
            key.updated_at = at;
        }
        Ok(())
    }

    async fn count_for_tenant(
        &self,
        tenant_id: Uuid,
        status: Option<KeyStatus>,
    ) -> Result<i64> {
        let count = self
            .keys
            .iter()
            .filter(|k| k.tenant_id == tenant_id)
            .filter(|k| status.map_or(true, |s| k.status == s))
            .count();
        Ok(count as i64)
    }

    async fn bind_user(&self, key_id: Uuid, user_id: Uuid) -> Result<()> {
        self.bindings.insert((key_id, user_id), ());
        Ok(())
    }

    async fn unbind_user(&self, key_id: Uuid, user_id: Uuid) -> Result<()> {
        self.bindings.remove(&(key_id, user_id));
        Ok(())
    }

    async fn users_for_key(&self, key_id: Uuid) -> Result<Vec<User>> {
        let mut rows: Vec<User> = self
            .bindings
            .iter()
            .filter(|b| b.key().0 == key_id)
            .filter_map(|b| self.users.get(&b.key().1).map(|u| u.clone()))
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn keys_for_user(&self, user_id: Uuid) -> Result<Vec<AccessKey>> {
        let mut rows: Vec<AccessKey> = self
            .bindings
            .iter()
            .filter(|b| b.key().1 == user_id)
            .filter_map(|b| self.keys.get(&b.key().0).map(|k| k.clone()))
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }
}

#[async_trait]
impl UserRepository for MemoryBackend {
    async fn insert(&self, user: &User) -> Result<()> {
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.handle == handle)
            .map(|u| u.clone()))
    }

    async fn list(&self) -> Result<Vec<User>> {
        let mut rows: Vec<User> = self.users.iter().map(|u| u.clone()).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool> {
        match self.users.get_mut(&id) {
            Some(mut user) => {
                user.active = active;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl AuditRepository for MemoryBackend {
    async fn append(&self, entry: &ValidationLogEntry) -> Result<()> {
        self.logs
            .lock()
            .expect("audit log lock poisoned")
            .push(entry.clone());
        Ok(())
    }

    async fn recent_for(&self, key_id: Uuid, limit: i64) -> Result<Vec<ValidationLogEntry>> {
        let logs = self.logs.lock().expect("audit log lock poisoned");
        Ok(logs
            .iter()
            .rev()
            .filter(|l| l.access_key_id == Some(key_id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EntryRepository for MemoryBackend {
    async fn insert(&self, entry: &VehicleEntry) -> Result<()> {
        self.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn count_entries_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.entry_time >= start && e.entry_time < end)
            .count() as i64)
    }

    async fn count_exits_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .filter(|e| e.exit_time.map_or(false, |x| x >= start && x < end))
            .count() as i64)
    }

    async fn count_parked(&self, tenant_id: Uuid) -> Result<i64> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.status == EntryStatus::Parked)
            .count() as i64)
    }

    async fn entries_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<VehicleEntry>> {
        let mut rows: Vec<VehicleEntry> = self
            .entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.entry_time >= start && e.entry_time < end)
            .map(|e| e.clone())
            .collect();
        rows.sort_by(|a, b| a.entry_time.cmp(&b.entry_time));
        Ok(rows)
    }

    async fn exits_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<VehicleEntry>> {
        let mut rows: Vec<VehicleEntry> = self
            .entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .filter(|e| e.exit_time.map_or(false, |x| x >= start && x < end))
            .map(|e| e.clone())
            .collect();
        rows.sort_by(|a, b| a.exit_time.cmp(&b.exit_time));
        Ok(rows)
    }

    async fn recent_entries_between(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<VehicleEntry>> {
        let mut rows = self.entries_between(tenant_id, start, end).await?;
        rows.reverse();
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn parked(&self, tenant_id: Uuid) -> Result<Vec<VehicleEntry>> {
        let mut rows: Vec<VehicleEntry> = self
            .entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.status == EntryStatus::Parked)
            .map(|e| e.clone())
            .collect();
        rows.sort_by(|a, b| b.entry_time.cmp(&a.entry_time));
        Ok(rows)
    }

    async fn entry_time_span(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let times: Vec<DateTime<Utc>> = self
            .entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .map(|e| e.entry_time)
            .collect();
        Ok(match (times.iter().min(), times.iter().max()) {
            (Some(first), Some(last)) => Some((*first, *last)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audit::ValidationOutcome;

    #[test]
    fn test_audit_log_is_append_only_newest_first() {
        let backend = MemoryBackend::default();
        let key_id = Uuid::new_v4();

        tokio_test::block_on(async {
            for outcome in [
                ValidationOutcome::Invalid,
                ValidationOutcome::Expired,
                ValidationOutcome::Valid,
            ] {
                let entry =
                    ValidationLogEntry::new(Some(key_id), None, outcome, None, None);
                backend.append(&entry).await.unwrap();
            }
            // A sentinel row for an unresolvable code is counted but not
            // addressable by key id.
            let sentinel = ValidationLogEntry::new(
                None,
                Some("dev".into()),
                ValidationOutcome::Invalid,
                None,
                None,
            );
            backend.append(&sentinel).await.unwrap();

            let rows = backend.recent_for(key_id, 50).await.unwrap();
            assert_eq!(rows.len(), 3);
            assert_eq!(rows[0].outcome, ValidationOutcome::Valid);
            assert_eq!(rows[2].outcome, ValidationOutcome::Invalid);

            let limited = backend.recent_for(key_id, 2).await.unwrap();
            assert_eq!(limited.len(), 2);
            assert_eq!(backend.validation_log_count(), 4);
        });
    }

    #[test]
    fn test_key_code_uniqueness_on_insert() {
        let backend = MemoryBackend::default();
        let now = Utc::now();
        let template = AccessKey {
            id: Uuid::new_v4(),
            code: "VALET-0123456789AB".into(),
            tenant_id: Uuid::new_v4(),
            client_name: "Acme".into(),
            client_email: None,
            client_phone: None,
            company_name: None,
            status: KeyStatus::Active,
            expires_at: now + chrono::Duration::days(30),
            revoked_at: None,
            revoked_reason: None,
            last_validated_at: None,
            device_id: None,
            observations: None,
            created_at: now,
            updated_at: now,
        };

        tokio_test::block_on(async {
            assert!(KeyRepository::insert(&backend, &template).await.unwrap());
            let mut duplicate = template.clone();
            duplicate.id = Uuid::new_v4();
            assert!(!KeyRepository::insert(&backend, &duplicate).await.unwrap());
            assert_eq!(KeyRepository::list(&backend).await.unwrap().len(), 1);
        });
    }
}
