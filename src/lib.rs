//! Valetgate — access-key licensing and tenant reporting backend.
//!
//! Library crate: the binary in `main.rs` and the integration tests in
//! `tests/` both build on these modules.

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod keys;
pub mod middleware;
pub mod models;
pub mod reports;
pub mod session;
pub mod store;

use chrono::Duration;

use crate::config::Config;
use crate::keys::KeyService;
use crate::reports::ReportAggregator;
use crate::session::CredentialIssuer;
use crate::store::Stores;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub store: Stores,
    pub keys: KeyService,
    pub issuer: CredentialIssuer,
    pub reports: ReportAggregator,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Stores, config: Config) -> Self {
        let keys = KeyService::new(
            store.keys.clone(),
            store.tenants.clone(),
            store.users.clone(),
            store.audit.clone(),
            config.key_prefix.clone(),
            config.utc_offset,
        );
        let issuer = CredentialIssuer::new(
            &config.jwt_secret,
            Duration::days(config.login_ttl_days),
            Duration::hours(config.refresh_ttl_hours),
        );
        let reports = ReportAggregator::new(store.entries.clone(), config.utc_offset);
        Self {
            store,
            keys,
            issuer,
            reports,
            config,
        }
    }
}
