//! Shared fixtures for the integration suites: an AppState wired to the
//! in-memory backend, plus seed helpers.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use uuid::Uuid;

use valetgate::config::Config;
use valetgate::models::entry::{EntryStatus, VehicleEntry};
use valetgate::models::key::{AccessKey, KeyStatus};
use valetgate::models::tenant::Tenant;
use valetgate::models::user::{Role, User};
use valetgate::session;
use valetgate::store::memory::MemoryBackend;
use valetgate::store::Stores;
use valetgate::AppState;

pub fn test_config(utc_offset: FixedOffset) -> Config {
    Config {
        port: 0,
        database_url: String::new(),
        jwt_secret: "integration-test-secret".into(),
        login_ttl_days: 7,
        refresh_ttl_hours: 8,
        utc_offset,
        key_prefix: "VALET".into(),
    }
}

/// AppState over a shared in-memory backend, reporting in UTC.
pub fn state() -> (Arc<AppState>, Arc<MemoryBackend>) {
    state_with_offset(FixedOffset::east_opt(0).unwrap())
}

/// Same, with an explicit report calendar offset.
pub fn state_with_offset(utc_offset: FixedOffset) -> (Arc<AppState>, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::default());
    let stores = Stores {
        tenants: backend.clone(),
        keys: backend.clone(),
        users: backend.clone(),
        audit: backend.clone(),
        entries: backend.clone(),
    };
    let state = Arc::new(AppState::new(stores, test_config(utc_offset)));
    (state, backend)
}

/// Offset of the host calendar; matches what `config::load` falls back to.
pub fn host_offset() -> FixedOffset {
    Local::now().offset().fix()
}

pub async fn seed_tenant(state: &AppState, name: &str) -> Tenant {
    let now = Utc::now();
    let tenant = Tenant {
        id: Uuid::new_v4(),
        name: name.into(),
        email: Some(format!("{}@example.com", name.to_lowercase().replace(' ', "-"))),
        phone: Some("+55 11 91234-5678".into()),
        company_name: Some(format!("{name} Ltda")),
        active: true,
        created_at: now,
        updated_at: now,
    };
    state.store.tenants.insert(&tenant).await.unwrap();
    tenant
}

/// Insert a key with a fixed code, bypassing generation.
pub async fn seed_key(
    state: &AppState,
    tenant: &Tenant,
    code: &str,
    status: KeyStatus,
    expires_at: DateTime<Utc>,
) -> AccessKey {
    let now = Utc::now();
    let key = AccessKey {
        id: Uuid::new_v4(),
        code: code.into(),
        tenant_id: tenant.id,
        client_name: tenant.name.clone(),
        client_email: tenant.email.clone(),
        client_phone: tenant.phone.clone(),
        company_name: tenant.company_name.clone(),
        status,
        expires_at,
        revoked_at: None,
        revoked_reason: None,
        last_validated_at: None,
        device_id: None,
        observations: None,
        created_at: now,
        updated_at: now,
    };
    assert!(state.store.keys.insert(&key).await.unwrap());
    key
}

pub async fn seed_user(state: &AppState, handle: &str, password: &str, role: Role) -> User {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        name: handle.into(),
        handle: handle.into(),
        password_hash: session::hash_password(password).unwrap(),
        phone: None,
        role,
        active: true,
        created_at: now,
        updated_at: now,
    };
    state.store.users.insert(&user).await.unwrap();
    user
}

pub async fn seed_entry(
    state: &AppState,
    tenant_id: Uuid,
    plate: &str,
    entry_time: DateTime<Utc>,
    exit_time: Option<DateTime<Utc>>,
) -> VehicleEntry {
    let entry = VehicleEntry {
        id: Uuid::new_v4(),
        tenant_id,
        plate: plate.into(),
        client_name: Some("Walk-in".into()),
        spot_number: None,
        status: if exit_time.is_some() {
            EntryStatus::Retrieved
        } else {
            EntryStatus::Parked
        },
        entry_time,
        exit_time,
        created_at: entry_time,
    };
    state.store.entries.insert(&entry).await.unwrap();
    entry
}
