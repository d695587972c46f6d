//! Persistence seam for the batch lifecycle engine
//!
//! Every method is one atomic unit of work: it either fully commits or
//! leaves no trace. Services compose domain rules on top and never hold a
//! store-level lock across calls.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::{
    Batch, BatchStage, BatchStatus, Bed, DateRange, Location, LossRecord, Measurement, Occupancy,
    Pagination, Pathway, Species, StageHistory, Task, TaskType, Zone,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A single occupancy adjustment.
///
/// A bed change is mirrored on the bed's zone so the zone counter always
/// includes everything placed in its beds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityChange {
    Reserve(Location, i32),
    Release(Location, i32),
}

impl CapacityChange {
    pub fn location(&self) -> Location {
        match self {
            CapacityChange::Reserve(location, _) | CapacityChange::Release(location, _) => {
                *location
            }
        }
    }

    pub fn quantity(&self) -> i32 {
        match self {
            CapacityChange::Reserve(_, quantity) | CapacityChange::Release(_, quantity) => {
                *quantity
            }
        }
    }
}

/// New batch state plus everything that must land with it
#[derive(Debug, Clone)]
pub struct BatchCommit {
    /// Batch as it should look after the commit; the store bumps `version`
    pub batch: Batch,
    /// Version the caller read; a mismatch is a concurrency conflict
    pub expected_version: i64,
    pub capacity_changes: Vec<CapacityChange>,
    pub history: Option<StageHistory>,
    pub loss: Option<LossRecord>,
    pub measurement: Option<Measurement>,
}

impl BatchCommit {
    pub fn new(batch: Batch, expected_version: i64) -> Self {
        Self {
            batch,
            expected_version,
            capacity_changes: Vec::new(),
            history: None,
            loss: None,
            measurement: None,
        }
    }
}

/// Partial update of a zone or bed
#[derive(Debug, Clone, Default)]
pub struct LocationPatch {
    pub name: Option<String>,
    pub capacity: Option<i32>,
    pub is_active: Option<bool>,
}

/// Batch list query
#[derive(Debug, Clone, Default)]
pub struct BatchFilter {
    pub status: Option<BatchStatus>,
    pub stage: Option<BatchStage>,
    pub pathway: Option<Pathway>,
    pub species_id: Option<Uuid>,
    pub zone_id: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    /// Case-insensitive match on batch number or custom name
    pub search: Option<String>,
    pub pagination: Pagination,
}

impl BatchFilter {
    pub fn matches(&self, batch: &Batch) -> bool {
        self.status.map_or(true, |s| batch.status == s)
            && self.stage.map_or(true, |s| batch.stage == s)
            && self.pathway.map_or(true, |p| batch.pathway == p)
            && self.species_id.map_or(true, |id| batch.species_id == id)
            && self.zone_id.map_or(true, |id| batch.zone_id == Some(id))
            && self.created_from.map_or(true, |from| batch.created_at >= from)
            && self.created_to.map_or(true, |to| batch.created_at <= to)
            && self.search_term().map_or(true, |term| {
                batch.batch_number.to_lowercase().contains(&term)
                    || batch
                        .custom_name
                        .as_deref()
                        .is_some_and(|name| name.to_lowercase().contains(&term))
            })
    }

    pub(crate) fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }
}

/// Measurement list query across batches
#[derive(Debug, Clone, Default)]
pub struct MeasurementFilter {
    pub batch_id: Option<Uuid>,
    /// Recorder
    pub user_id: Option<Uuid>,
    /// Calendar days (UTC) the measurement was taken on
    pub date_range: Option<DateRange>,
}

impl MeasurementFilter {
    pub fn matches(&self, measurement: &Measurement) -> bool {
        self.batch_id.map_or(true, |id| measurement.batch_id == id)
            && self.user_id.map_or(true, |id| measurement.user_id == id)
            && self
                .date_range
                .as_ref()
                .map_or(true, |range| range.contains(measurement.created_at.date_naive()))
    }
}

/// Task list query
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub task_type: Option<TaskType>,
    pub completed: Option<bool>,
    /// Assignee
    pub user_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub zone_id: Option<Uuid>,
    /// Calendar days (UTC) the task is due on
    pub due_on: Option<DateRange>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
    /// Case-insensitive match on title or description
    pub search: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.task_type.map_or(true, |t| task.task_type == t)
            && self.completed.map_or(true, |c| task.is_completed == c)
            && self.user_id.map_or(true, |id| task.user_id == id)
            && self.batch_id.map_or(true, |id| task.batch_id == Some(id))
            && self.zone_id.map_or(true, |id| task.zone_id == Some(id))
            && self
                .due_on
                .as_ref()
                .map_or(true, |range| range.contains(task.due_date.date_naive()))
            && self.due_from.map_or(true, |from| task.due_date >= from)
            && self.due_to.map_or(true, |to| task.due_date <= to)
            && self.search_term().map_or(true, |term| {
                task.title.to_lowercase().contains(&term)
                    || task
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&term))
            })
    }

    pub(crate) fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }
}

/// Batch counts feeding the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub total: i64,
    pub ready: i64,
    pub in_progress: i64,
    /// Living plants across non-terminal batches
    pub live_plants: i64,
}

#[async_trait]
pub trait NurseryStore: Send + Sync {
    // Species
    async fn insert_species(&self, species: &Species) -> AppResult<()>;
    async fn update_species(&self, species: &Species) -> AppResult<()>;
    /// Fails with `Conflict` while any batch references the species
    async fn delete_species(&self, id: Uuid) -> AppResult<()>;
    async fn get_species(&self, id: Uuid) -> AppResult<Option<Species>>;
    async fn list_species(&self, active_only: bool) -> AppResult<Vec<Species>>;

    // Zones and beds
    async fn insert_zone(&self, zone: &Zone) -> AppResult<()>;
    /// Rejects a capacity below current occupancy
    async fn update_zone(&self, id: Uuid, patch: &LocationPatch) -> AppResult<Zone>;
    /// Only empty zones without beds can be deleted
    async fn delete_zone(&self, id: Uuid) -> AppResult<()>;
    async fn get_zone(&self, id: Uuid) -> AppResult<Option<Zone>>;
    async fn list_zones(&self) -> AppResult<Vec<Zone>>;
    async fn insert_bed(&self, bed: &Bed) -> AppResult<()>;
    async fn update_bed(&self, id: Uuid, patch: &LocationPatch) -> AppResult<Bed>;
    async fn delete_bed(&self, id: Uuid) -> AppResult<()>;
    async fn get_bed(&self, id: Uuid) -> AppResult<Option<Bed>>;
    async fn list_beds(&self, zone_id: Option<Uuid>) -> AppResult<Vec<Bed>>;

    // Capacity
    async fn occupancy(&self, location: Location) -> AppResult<Occupancy>;
    /// Apply every change or none of them
    async fn apply_capacity(&self, changes: &[CapacityChange]) -> AppResult<()>;

    // Batches
    /// Next number in the (pathway, day) sequence, starting at 1
    async fn next_batch_sequence(&self, pathway: Pathway, day: NaiveDate) -> AppResult<u32>;
    /// Persist a new batch together with its initial placement
    async fn insert_batch(&self, batch: &Batch, changes: &[CapacityChange]) -> AppResult<()>;
    async fn get_batch(&self, id: Uuid) -> AppResult<Option<Batch>>;
    async fn list_batches(&self, filter: &BatchFilter) -> AppResult<(Vec<Batch>, u64)>;
    async fn commit_batch(&self, commit: BatchCommit) -> AppResult<Batch>;
    async fn stage_history(&self, batch_id: Uuid) -> AppResult<Vec<StageHistory>>;
    async fn loss_records(&self, batch_id: Uuid) -> AppResult<Vec<LossRecord>>;
    async fn measurements(&self, batch_id: Uuid) -> AppResult<Vec<Measurement>>;
    /// Newest first
    async fn list_measurements(&self, filter: &MeasurementFilter) -> AppResult<Vec<Measurement>>;

    // Tasks
    async fn insert_task(&self, task: &Task) -> AppResult<()>;
    async fn get_task(&self, id: Uuid) -> AppResult<Option<Task>>;
    /// Fails with `Conflict` when the task is already completed
    async fn complete_task(&self, id: Uuid, completed_at: DateTime<Utc>) -> AppResult<Task>;
    async fn delete_task(&self, id: Uuid) -> AppResult<()>;
    /// Earliest due first
    async fn list_tasks(&self, filter: &TaskFilter) -> AppResult<Vec<Task>>;

    // Reporting
    async fn batch_counts(&self) -> AppResult<BatchCounts>;
    /// Non-terminal batches per zone, counting batches placed in the zone's beds
    async fn active_batches_by_zone(&self) -> AppResult<HashMap<Uuid, i64>>;
    async fn count_pending_tasks(&self) -> AppResult<i64>;
    async fn count_measurements_since(&self, since: DateTime<Utc>) -> AppResult<i64>;
}

/// Apply a zone or bed patch, refusing a capacity below `occupied`
pub(crate) fn apply_patch(
    name: &mut String,
    capacity: &mut i32,
    is_active: &mut bool,
    occupied: i32,
    patch: &LocationPatch,
) -> AppResult<()> {
    if let Some(new_capacity) = patch.capacity {
        if new_capacity < occupied {
            return Err(AppError::validation(
                "capacity",
                format!(
                    "Capacity {} is below current occupancy {}",
                    new_capacity, occupied
                ),
            ));
        }
        *capacity = new_capacity;
    }
    if let Some(new_name) = &patch.name {
        *name = new_name.clone();
    }
    if let Some(active) = patch.is_active {
        *is_active = active;
    }
    Ok(())
}

/// Capacity figures of one row while a unit of work is staged
#[derive(Debug, Clone, Copy)]
pub(crate) struct Slot {
    pub capacity: i32,
    pub occupied: i32,
    pub is_active: bool,
}

/// Stage `changes` against `slots`.
///
/// `slots` must hold every location touched, including the parent zone of
/// each bed, and `parent_zone` resolves a bed to its zone. On error the
/// slots are left partly updated, so callers stage on copies.
pub(crate) fn stage_capacity_changes(
    changes: &[CapacityChange],
    slots: &mut HashMap<Location, Slot>,
    parent_zone: impl Fn(Uuid) -> Option<Uuid>,
) -> AppResult<()> {
    for change in changes {
        let location = change.location();
        let quantity = change.quantity();
        if quantity < 0 {
            return Err(AppError::InvalidQuantity(format!(
                "capacity change on {} must not be negative",
                location
            )));
        }
        if quantity == 0 {
            continue;
        }

        let mut chain = vec![location];
        if let Location::Bed(bed_id) = location {
            let zone_id = parent_zone(bed_id)
                .ok_or_else(|| AppError::Internal(format!("bed {} has no zone", bed_id)))?;
            chain.push(Location::Zone(zone_id));
        }

        for target in chain {
            let slot = slots
                .get_mut(&target)
                .ok_or_else(|| AppError::NotFound(target.to_string()))?;
            match change {
                CapacityChange::Reserve(..) => reserve_slot(target, slot, quantity)?,
                CapacityChange::Release(..) => release_slot(target, slot, quantity),
            }
        }
    }
    Ok(())
}

fn reserve_slot(target: Location, slot: &mut Slot, quantity: i32) -> AppResult<()> {
    if !slot.is_active {
        return Err(AppError::validation(
            target.kind(),
            format!("{} is inactive and cannot accept plants", target),
        ));
    }
    if i64::from(slot.occupied) + i64::from(quantity) > i64::from(slot.capacity) {
        tracing::warn!(
            location = %target,
            capacity = slot.capacity,
            occupied = slot.occupied,
            requested = quantity,
            "capacity reservation rejected"
        );
        return Err(AppError::CapacityExceeded {
            location: target,
            capacity: slot.capacity,
            occupied: slot.occupied,
            requested: quantity,
        });
    }
    slot.occupied += quantity;
    Ok(())
}

fn release_slot(target: Location, slot: &mut Slot, quantity: i32) {
    if quantity > slot.occupied {
        tracing::warn!(
            location = %target,
            occupied = slot.occupied,
            released = quantity,
            "release exceeds occupancy, clamping to zero"
        );
        slot.occupied = 0;
    } else {
        slot.occupied -= quantity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(zone: Uuid, bed: Uuid) -> HashMap<Location, Slot> {
        HashMap::from([
            (
                Location::Zone(zone),
                Slot {
                    capacity: 1000,
                    occupied: 0,
                    is_active: true,
                },
            ),
            (
                Location::Bed(bed),
                Slot {
                    capacity: 900,
                    occupied: 0,
                    is_active: true,
                },
            ),
        ])
    }

    #[test]
    fn test_bed_reservation_counts_against_zone() {
        let (zone, bed) = (Uuid::new_v4(), Uuid::new_v4());
        let mut slots = slots(zone, bed);
        stage_capacity_changes(
            &[CapacityChange::Reserve(Location::Bed(bed), 850)],
            &mut slots,
            |_| Some(zone),
        )
        .unwrap();
        assert_eq!(slots[&Location::Bed(bed)].occupied, 850);
        assert_eq!(slots[&Location::Zone(zone)].occupied, 850);

        let err = stage_capacity_changes(
            &[CapacityChange::Reserve(Location::Bed(bed), 100)],
            &mut slots,
            |_| Some(zone),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::CapacityExceeded { capacity: 900, occupied: 850, requested: 100, .. }
        ));
    }

    #[test]
    fn test_release_clamps_to_zero() {
        let (zone, bed) = (Uuid::new_v4(), Uuid::new_v4());
        let mut slots = slots(zone, bed);
        let changes = [
            CapacityChange::Reserve(Location::Zone(zone), 10),
            CapacityChange::Release(Location::Zone(zone), 25),
        ];
        stage_capacity_changes(&changes, &mut slots, |_| Some(zone)).unwrap();
        assert_eq!(slots[&Location::Zone(zone)].occupied, 0);
    }

    #[test]
    fn test_inactive_location_rejects_reservation() {
        let (zone, bed) = (Uuid::new_v4(), Uuid::new_v4());
        let mut slots = slots(zone, bed);
        slots.get_mut(&Location::Bed(bed)).unwrap().is_active = false;
        let err = stage_capacity_changes(
            &[CapacityChange::Reserve(Location::Bed(bed), 1)],
            &mut slots,
            |_| Some(zone),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_filter_search_matches_number_and_name() {
        let filter = BatchFilter {
            search: Some(" teak ".to_string()),
            ..Default::default()
        };
        assert_eq!(filter.search_term().as_deref(), Some("teak"));
    }
}
