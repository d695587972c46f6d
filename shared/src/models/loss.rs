//! Plant loss records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An irreversible reduction of a batch's living quantity.
///
/// Loss records are never edited; a correction is a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossRecord {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub quantity: i32,
    pub reason: String,
    pub recorded_by: Uuid,
    pub created_at: DateTime<Utc>,
}
