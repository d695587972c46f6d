//! Dashboard and utilization views

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capacity use of one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneUtilization {
    pub zone_id: Uuid,
    pub zone_name: String,
    pub capacity: i32,
    pub occupied: i32,
    pub utilization_percentage: Decimal,
    /// Non-terminal batches placed in the zone or one of its beds
    pub active_batches: i64,
    /// Utilization at or above the configured alert threshold
    pub over_threshold: bool,
}

/// Headline numbers for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_batches: i64,
    pub ready_batches: i64,
    pub in_progress_batches: i64,
    /// Living plants across non-terminal batches
    pub total_plants: i64,
    pub active_species: i64,
    pub zones_utilization: Decimal,
    /// Tasks not yet completed
    pub pending_tasks: i64,
    /// Measurements recorded in the last seven days
    pub weekly_measurements: i64,
}
