use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Outcome of one access-key validation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ValidationOutcome {
    Valid,
    Invalid,
    Expired,
    Revoked,
}

/// Immutable audit row, written for every validation attempt — success or
/// failure. The core exposes no update or delete for these rows.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ValidationLogEntry {
    pub id: Uuid,
    /// `None` when the presented code resolved to no key; serialized as
    /// the sentinel string `"unknown"` on the wire.
    #[serde(serialize_with = "unknown_if_none")]
    pub access_key_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub outcome: ValidationOutcome,
    pub app_version: Option<String>,
    pub os_version: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ValidationLogEntry {
    pub fn new(
        access_key_id: Option<Uuid>,
        device_id: Option<String>,
        outcome: ValidationOutcome,
        app_version: Option<String>,
        os_version: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            access_key_id,
            device_id,
            outcome,
            app_version,
            os_version,
            created_at: Utc::now(),
        }
    }
}

fn unknown_if_none<S: Serializer>(
    id: &Option<Uuid>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match id {
        Some(id) => serializer.serialize_str(&id.to_string()),
        None => serializer.serialize_str("unknown"),
    }
}
