use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a vehicle is still in the yard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum EntryStatus {
    Parked,
    Retrieved,
}

/// One vehicle movement record. Owned by the vehicle-entry subsystem (out
/// of scope here); the report aggregator only reads these rows, always
/// filtered by tenant.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VehicleEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub plate: String,
    pub client_name: Option<String>,
    pub spot_number: Option<String>,
    pub status: EntryStatus,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl VehicleEntry {
    /// Minutes between entry and exit, `None` while still parked.
    pub fn duration_minutes(&self) -> Option<i64> {
        self.exit_time.map(|exit| (exit - self.entry_time).num_minutes())
    }
}
