use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of an access key.
///
/// Transitions are one-directional into `Revoked`: nothing un-revokes a
/// key. `Inactive` keys can be switched back to `Active` by an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Inactive,
    Revoked,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Inactive => "inactive",
            KeyStatus::Revoked => "revoked",
        }
    }
}

/// A licensing credential issued to a tenant. Gates mobile-client
/// activation; the contact fields are a denormalized copy of the tenant
/// contact at issue time.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    pub id: Uuid,
    /// Unique wire format: `VALET-<12 uppercase hex chars>`.
    pub code: String,
    pub tenant_id: Uuid,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub company_name: Option<String>,
    pub status: KeyStatus,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub device_id: Option<String>,
    pub observations: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field-wise patch for an access key. Every updatable field is optional;
/// the owning tenant is deliberately not representable here, so a patch
/// can never move a key between tenants.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyPatch {
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub company_name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: Option<KeyStatus>,
    pub observations: Option<String>,
}

impl AccessKey {
    /// Merge a patch into the key. Lifecycle rules (revoked is terminal,
    /// revocation is its own operation) are enforced by the caller before
    /// this runs.
    pub fn apply(&mut self, patch: AccessKeyPatch) {
        if let Some(client_name) = patch.client_name {
            self.client_name = client_name;
        }
        if let Some(client_email) = patch.client_email {
            self.client_email = Some(client_email);
        }
        if let Some(client_phone) = patch.client_phone {
            self.client_phone = Some(client_phone);
        }
        if let Some(company_name) = patch.company_name {
            self.company_name = Some(company_name);
        }
        if let Some(expires_at) = patch.expires_at {
            self.expires_at = expires_at;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(observations) = patch.observations {
            self.observations = Some(observations);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> AccessKey {
        let now = Utc::now();
        AccessKey {
            id: Uuid::new_v4(),
            code: "VALET-AAAAAAAAAAAA".into(),
            tenant_id: Uuid::new_v4(),
            client_name: "Acme Valet".into(),
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
        }
    }

    #[test]
    fn test_apply_only_touches_provided_fields() {
        let mut key = sample_key();
        let original_expiry = key.expires_at;
        key.apply(AccessKeyPatch {
            client_email: Some("ops@acme.example".into()),
            ..Default::default()
        });
        assert_eq!(key.client_email.as_deref(), Some("ops@acme.example"));
        assert_eq!(key.client_name, "Acme Valet");
        assert_eq!(key.expires_at, original_expiry);
        assert_eq!(key.status, KeyStatus::Active);
    }

    #[test]
    fn test_patch_has_no_tenant_field() {
        // Deserializing a body that names a tenant must not silently move
        // the key: the field simply does not exist on the patch.
        let patch: AccessKeyPatch =
            serde_json::from_str(r#"{"clientName":"New Name"}"#).unwrap();
        let mut key = sample_key();
        let tenant_id = key.tenant_id;
        key.apply(patch);
        assert_eq!(key.tenant_id, tenant_id);
        assert_eq!(key.client_name, "New Name");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&KeyStatus::Revoked).unwrap(),
            "\"revoked\""
        );
        assert_eq!(KeyStatus::Inactive.as_str(), "inactive");
    }
}
