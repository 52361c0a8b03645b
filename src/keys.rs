//! Access-key lifecycle — validation, issuance, renewal, revocation,
//! user binding.
//!
//! The validation path intentionally runs as three independent
//! statements (lookup, metadata touch, audit append): there is no
//! transaction across them, and concurrent validations of the same key
//! are last-writer-wins on `device_id`/`last_validated_at`.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Months, NaiveDate, NaiveTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::audit::{ValidationLogEntry, ValidationOutcome};
use crate::models::key::{AccessKey, AccessKeyPatch, KeyStatus};
use crate::models::user::User;
use crate::store::{AuditRepository, KeyRepository, TenantRepository, UserRepository};

const CODE_RANDOM_BYTES: usize = 6;
const MAX_CODE_ATTEMPTS: u32 = 8;
const DEFAULT_RENEW_MONTHS: u32 = 12;
const DEFAULT_REVOKE_REASON: &str = "no reason given";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub code: Option<String>,
    pub device_id: Option<String>,
    pub app_version: Option<String>,
    pub os_version: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSuccess {
    pub key_id: Uuid,
    /// Display name of the owning tenant (denormalized at issue time).
    pub tenant_display_name: String,
    pub expires_at: DateTime<Utc>,
    pub days_remaining: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccessKey {
    pub client_id: Option<Uuid>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub company_name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub observations: Option<String>,
}

#[derive(Clone)]
pub struct KeyService {
    keys: Arc<dyn KeyRepository>,
    tenants: Arc<dyn TenantRepository>,
    users: Arc<dyn UserRepository>,
    audit: Arc<dyn AuditRepository>,
    code_prefix: String,
    tz: FixedOffset,
}

impl KeyService {
    pub fn new(
        keys: Arc<dyn KeyRepository>,
        tenants: Arc<dyn TenantRepository>,
        users: Arc<dyn UserRepository>,
        audit: Arc<dyn AuditRepository>,
        code_prefix: String,
        tz: FixedOffset,
    ) -> Self {
        Self {
            keys,
            tenants,
            users,
            audit,
            code_prefix,
            tz,
        }
    }

    /// Validate a presented key code against its lifecycle state. Every
    /// attempt that carries a code, failures included, leaves an audit
    /// row before the result is returned.
    pub async fn validate(
        &self,
        req: &ValidateRequest,
    ) -> Result<ValidationSuccess, AppError> {
        let code = match req.code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => code,
            _ => return Err(AppError::MissingKey),
        };

        let key = match self.keys.find_by_code(code).await? {
            Some(key) => key,
            None => {
                self.audit_attempt(None, ValidationOutcome::Invalid, req)
                    .await?;
                tracing::info!(device = ?req.device_id, "validation of unknown key code");
                return Err(AppError::InvalidKey);
            }
        };

        // Revocation wins over expiry: a revoked key is never reported
        // as merely expired.
        if key.status == KeyStatus::Revoked {
            self.audit_attempt(Some(key.id), ValidationOutcome::Revoked, req)
                .await?;
            return Err(AppError::AccessRevoked {
                reason: key.revoked_reason,
            });
        }

        let now = Utc::now();
        if key.expires_at <= now {
            self.audit_attempt(Some(key.id), ValidationOutcome::Expired, req)
                .await?;
            return Err(AppError::AccessExpired {
                expires_at: key.expires_at,
            });
        }

        self.keys
            .touch_validation(key.id, req.device_id.as_deref(), now)
            .await?;
        self.audit_attempt(Some(key.id), ValidationOutcome::Valid, req)
            .await?;

        Ok(ValidationSuccess {
            key_id: key.id,
            tenant_display_name: key.client_name,
            expires_at: key.expires_at,
            days_remaining: days_remaining(key.expires_at, now),
        })
    }

    async fn audit_attempt(
        &self,
        key_id: Option<Uuid>,
        outcome: ValidationOutcome,
        req: &ValidateRequest,
    ) -> Result<(), AppError> {
        // Awaited on every path: a lost audit row is worse than a slower
        // failure response.
        let entry = ValidationLogEntry::new(
            key_id,
            req.device_id.clone(),
            outcome,
            req.app_version.clone(),
            req.os_version.clone(),
        );
        self.audit.append(&entry).await?;
        Ok(())
    }

    /// One candidate code: `PREFIX-<12 uppercase hex chars>`.
    pub fn generate_code(&self) -> String {
        generate_code(&self.code_prefix)
    }

    /// Create a key for an existing tenant. Uniqueness of the code is
    /// settled by the storage layer; generation retries a bounded number
    /// of times before giving up.
    pub async fn create(&self, req: NewAccessKey) -> Result<AccessKey, AppError> {
        let tenant_id = req
            .client_id
            .ok_or_else(|| AppError::Validation("clientId is required".into()))?;
        let client_name = match req.client_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(AppError::Validation("clientName is required".into())),
        };
        let expires_at = req
            .expires_at
            .ok_or_else(|| AppError::Validation("expiresAt is required".into()))?;
        if expires_at <= Utc::now() {
            return Err(AppError::Validation(
                "expiresAt must be in the future".into(),
            ));
        }

        let tenant = self
            .tenants
            .find(tenant_id)
            .await?
            .ok_or(AppError::NotFound("tenant"))?;

        let now = Utc::now();
        let mut key = AccessKey {
            id: Uuid::new_v4(),
            code: String::new(),
            tenant_id,
            client_name,
            client_email: req.client_email.or(tenant.email),
            client_phone: req.client_phone.or(tenant.phone),
            company_name: req.company_name.or(tenant.company_name),
            status: KeyStatus::Active,
            expires_at,
            revoked_at: None,
            revoked_reason: None,
            last_validated_at: None,
            device_id: None,
            observations: req.observations,
            created_at: now,
            updated_at: now,
        };

        for attempt in 0..MAX_CODE_ATTEMPTS {
            key.code = self.generate_code();
            if self.keys.find_by_code(&key.code).await?.is_some() {
                continue;
            }
            if self.keys.insert(&key).await? {
                return Ok(key);
            }
            // Lost the insert race for this candidate; back off briefly
            // and draw a fresh one.
            tracing::warn!(attempt, "access key code collision on insert");
            tokio::time::sleep(std::time::Duration::from_millis(
                10 * u64::from(attempt + 1),
            ))
            .await;
        }
        Err(AppError::CodeGenerationFailed)
    }

    /// Partial update. The owning tenant is not updatable; revoked keys
    /// accept contact edits only.
    pub async fn update(
        &self,
        id: Uuid,
        patch: AccessKeyPatch,
    ) -> Result<AccessKey, AppError> {
        let mut key = self
            .keys
            .find(id)
            .await?
            .ok_or(AppError::NotFound("access key"))?;

        if patch.status == Some(KeyStatus::Revoked) {
            return Err(AppError::Validation(
                "use the revoke operation to revoke a key".into(),
            ));
        }
        if key.status == KeyStatus::Revoked
            && (patch.status.is_some() || patch.expires_at.is_some())
        {
            return Err(AppError::Validation(
                "a revoked access key cannot be reactivated or extended".into(),
            ));
        }
        if let Some(expires_at) = patch.expires_at {
            if expires_at <= Utc::now() {
                return Err(AppError::Validation(
                    "expiresAt must be in the future".into(),
                ));
            }
        }

        key.apply(patch);
        key.updated_at = Utc::now();
        self.keys.update(&key).await?;
        Ok(key)
    }

    /// Renew from now: the new expiry is the same day-of-month `months`
    /// months from today, not an extension of the current expiry.
    pub async fn renew(&self, id: Uuid, months: Option<u32>) -> Result<AccessKey, AppError> {
        let months = months.unwrap_or(DEFAULT_RENEW_MONTHS);
        if months == 0 || months > 120 {
            return Err(AppError::Validation(
                "months must be between 1 and 120".into(),
            ));
        }

        let mut key = self
            .keys
            .find(id)
            .await?
            .ok_or(AppError::NotFound("access key"))?;
        if key.status == KeyStatus::Revoked {
            return Err(AppError::Validation(
                "a revoked access key cannot be renewed".into(),
            ));
        }

        let today = Utc::now().with_timezone(&self.tz).date_naive();
        key.expires_at = renewed_expiry(today, months, self.tz);
        key.updated_at = Utc::now();
        self.keys.update(&key).await?;
        tracing::info!(key_id = %key.id, months, expires_at = %key.expires_at, "access key renewed");
        Ok(key)
    }

    /// Revoked is terminal. Re-revoking is a no-op that preserves the
    /// first revocation.
    pub async fn revoke(&self, id: Uuid, reason: Option<String>) -> Result<AccessKey, AppError> {
        let mut key = self
            .keys
            .find(id)
            .await?
            .ok_or(AppError::NotFound("access key"))?;
        if key.status == KeyStatus::Revoked {
            return Ok(key);
        }

        let now = Utc::now();
        key.status = KeyStatus::Revoked;
        key.revoked_at = Some(now);
        key.revoked_reason = Some(
            reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_REVOKE_REASON.into()),
        );
        key.updated_at = now;
        self.keys.update(&key).await?;
        tracing::info!(key_id = %key.id, reason = ?key.revoked_reason, "access key revoked");
        Ok(key)
    }

    /// Bind an operator to a key. An operator can work across keys of
    /// one tenant only; that rule lives here, not in the schema.
    pub async fn bind_user(&self, key_id: Uuid, user_id: Uuid) -> Result<Vec<User>, AppError> {
        let key = self
            .keys
            .find(key_id)
            .await?
            .ok_or(AppError::NotFound("access key"))?;
        let user = self
            .users
            .find(user_id)
            .await?
            .ok_or(AppError::NotFound("user"))?;

        let existing = self.keys.keys_for_user(user.id).await?;
        if existing.iter().any(|k| k.tenant_id != key.tenant_id) {
            return Err(AppError::Validation(
                "user is already bound to another tenant's access keys".into(),
            ));
        }

        self.keys.bind_user(key_id, user_id).await?;
        Ok(self.keys.users_for_key(key_id).await?)
    }

    pub async fn unbind_user(&self, key_id: Uuid, user_id: Uuid) -> Result<Vec<User>, AppError> {
        if self.keys.find(key_id).await?.is_none() {
            return Err(AppError::NotFound("access key"));
        }
        self.keys.unbind_user(key_id, user_id).await?;
        Ok(self.keys.users_for_key(key_id).await?)
    }

    /// Tenant the user works for, via the key bindings. All bindings of
    /// one user share a tenant by construction.
    pub async fn tenant_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, AppError> {
        let keys = self.keys.keys_for_user(user_id).await?;
        Ok(keys.first().map(|k| k.tenant_id))
    }
}

/// `PREFIX-<12 uppercase hex chars>` from the OS random source.
pub fn generate_code(prefix: &str) -> String {
    let mut raw = [0u8; CODE_RANDOM_BYTES];
    OsRng.fill_bytes(&mut raw);
    format!("{}-{}", prefix, hex::encode(raw).to_uppercase())
}

/// Whole days until expiry, rounded up. Only meaningful while
/// `expires_at > now`.
pub(crate) fn days_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (expires_at - now).num_seconds();
    (secs + 86_399) / 86_400
}

/// Same day-of-month `months` months after `today`, at local midnight.
/// Day-of-month overflow clamps to the end of the target month.
pub(crate) fn renewed_expiry(today: NaiveDate, months: u32, tz: FixedOffset) -> DateTime<Utc> {
    let target = today + Months::new(months);
    let midnight = target.and_time(NaiveTime::MIN);
    match midnight.and_local_timezone(tz) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        // A fixed offset maps every local time exactly once; this arm is
        // unreachable for FixedOffset.
        _ => DateTime::from_naive_utc_and_offset(midnight, Utc),
    }
}
