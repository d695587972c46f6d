//! Growing zones and beds

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A growing zone. Owns zero or more beds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    /// Capacity in plants
    pub capacity: i32,
    /// Plants placed in this zone, directly or through one of its beds
    pub occupied: i32,
    pub is_active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A bed inside a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bed {
    pub id: Uuid,
    pub zone_id: Uuid,
    pub name: String,
    pub capacity: i32,
    pub occupied: i32,
    pub is_active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A place that holds capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Location {
    Zone(Uuid),
    Bed(Uuid),
}

impl Location {
    pub fn id(&self) -> Uuid {
        match self {
            Location::Zone(id) | Location::Bed(id) => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Location::Zone(_) => "zone",
            Location::Bed(_) => "bed",
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// Capacity snapshot of a location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub location: Location,
    pub capacity: i32,
    pub occupied: i32,
}

/// Occupied share of capacity as a percentage rounded to one decimal place
pub fn utilization_percent(capacity: i32, occupied: i32) -> Decimal {
    if capacity <= 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(occupied) * Decimal::from(100) / Decimal::from(capacity)).round_dp(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization_percent() {
        assert_eq!(utilization_percent(1000, 850), Decimal::new(850, 1));
        assert_eq!(utilization_percent(900, 630), Decimal::new(700, 1));
        assert_eq!(utilization_percent(3, 1), Decimal::new(333, 1));
        assert_eq!(utilization_percent(0, 0), Decimal::ZERO);
    }

    #[test]
    fn test_location_serialization() {
        let id = Uuid::nil();
        let json = serde_json::to_string(&Location::Bed(id)).unwrap();
        assert_eq!(
            json,
            "{\"kind\":\"bed\",\"id\":\"00000000-0000-0000-0000-000000000000\"}"
        );
    }
}
