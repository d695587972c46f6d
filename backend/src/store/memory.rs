//! In-memory arena of aggregates keyed by id
//!
//! Each zone, bed and batch sits behind its own mutex. A unit of work locks
//! rows in a fixed order (batch, then zones by id, then beds by id), stages
//! capacity changes on copies and writes back only when every change holds.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::{
    Batch, BatchStatus, Bed, Location, LossRecord, Measurement, Occupancy, Pathway, Species,
    StageHistory, Task, Zone,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::{
    apply_patch, stage_capacity_changes, BatchCommit, BatchCounts, BatchFilter, CapacityChange,
    LocationPatch, MeasurementFilter, NurseryStore, Slot, TaskFilter,
};
use crate::error::{AppError, AppResult};

type Row<T> = Arc<Mutex<T>>;

#[derive(Default)]
pub struct MemoryStore {
    species: RwLock<HashMap<Uuid, Species>>,
    zones: RwLock<HashMap<Uuid, Row<Zone>>>,
    beds: RwLock<HashMap<Uuid, Row<Bed>>>,
    batches: RwLock<HashMap<Uuid, Row<Batch>>>,
    history: RwLock<HashMap<Uuid, Vec<StageHistory>>>,
    losses: RwLock<HashMap<Uuid, Vec<LossRecord>>>,
    measurements: RwLock<HashMap<Uuid, Vec<Measurement>>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
    sequences: Mutex<HashMap<(Pathway, NaiveDate), u32>>,
}

fn lock<T>(mutex: &Mutex<T>) -> AppResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("store row lock poisoned".to_string()))
}

fn read<T>(lock: &RwLock<T>) -> AppResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| AppError::Internal("store table lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> AppResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| AppError::Internal("store table lock poisoned".to_string()))
}

/// Rows touched by a set of capacity changes, sorted by id
struct CapacityRows {
    zones: BTreeMap<Uuid, Row<Zone>>,
    beds: BTreeMap<Uuid, Row<Bed>>,
}

/// Locked rows of a unit of work
struct CapacityGuards<'a> {
    zones: BTreeMap<Uuid, MutexGuard<'a, Zone>>,
    beds: BTreeMap<Uuid, MutexGuard<'a, Bed>>,
}

impl CapacityRows {
    fn lock(&self) -> AppResult<CapacityGuards<'_>> {
        let mut zones = BTreeMap::new();
        for (id, row) in &self.zones {
            zones.insert(*id, lock(row)?);
        }
        let mut beds = BTreeMap::new();
        for (id, row) in &self.beds {
            beds.insert(*id, lock(row)?);
        }
        Ok(CapacityGuards { zones, beds })
    }
}

impl CapacityGuards<'_> {
    /// Stage `changes` on copies and write back only if all of them succeed
    fn apply(&mut self, changes: &[CapacityChange]) -> AppResult<()> {
        let mut slots: HashMap<Location, Slot> = HashMap::new();
        for (id, zone) in &self.zones {
            slots.insert(
                Location::Zone(*id),
                Slot {
                    capacity: zone.capacity,
                    occupied: zone.occupied,
                    is_active: zone.is_active,
                },
            );
        }
        for (id, bed) in &self.beds {
            slots.insert(
                Location::Bed(*id),
                Slot {
                    capacity: bed.capacity,
                    occupied: bed.occupied,
                    is_active: bed.is_active,
                },
            );
        }
        let parents: HashMap<Uuid, Uuid> =
            self.beds.iter().map(|(id, bed)| (*id, bed.zone_id)).collect();

        stage_capacity_changes(changes, &mut slots, |bed_id| parents.get(&bed_id).copied())?;

        let now = Utc::now();
        for (id, zone) in self.zones.iter_mut() {
            if let Some(slot) = slots.get(&Location::Zone(*id)) {
                if slot.occupied != zone.occupied {
                    zone.occupied = slot.occupied;
                    zone.version += 1;
                    zone.updated_at = now;
                }
            }
        }
        for (id, bed) in self.beds.iter_mut() {
            if let Some(slot) = slots.get(&Location::Bed(*id)) {
                if slot.occupied != bed.occupied {
                    bed.occupied = slot.occupied;
                    bed.version += 1;
                    bed.updated_at = now;
                }
            }
        }
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn zone_row(&self, id: Uuid) -> AppResult<Row<Zone>> {
        read(&self.zones)?
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("zone", id))
    }

    fn bed_row(&self, id: Uuid) -> AppResult<Row<Bed>> {
        read(&self.beds)?
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("bed", id))
    }

    fn batch_row(&self, id: Uuid) -> AppResult<Row<Batch>> {
        read(&self.batches)?
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("batch", id))
    }

    /// Resolve every row a set of changes touches, including parent zones of beds
    fn capacity_rows(&self, changes: &[CapacityChange]) -> AppResult<CapacityRows> {
        let mut zone_ids = BTreeSet::new();
        let mut beds = BTreeMap::new();
        for change in changes.iter().filter(|c| c.quantity() != 0) {
            match change.location() {
                Location::Zone(id) => {
                    zone_ids.insert(id);
                }
                Location::Bed(id) => {
                    let row = self.bed_row(id)?;
                    let zone_id = lock(&row)?.zone_id;
                    zone_ids.insert(zone_id);
                    beds.insert(id, row);
                }
            }
        }
        let mut zones = BTreeMap::new();
        for id in zone_ids {
            zones.insert(id, self.zone_row(id)?);
        }
        Ok(CapacityRows { zones, beds })
    }

    fn all_batches(&self) -> AppResult<Vec<Batch>> {
        let rows: Vec<Row<Batch>> = read(&self.batches)?.values().cloned().collect();
        rows.iter()
            .map(|row| lock(row).map(|batch| batch.clone()))
            .collect()
    }
}

#[async_trait]
impl NurseryStore for MemoryStore {
    async fn insert_species(&self, species: &Species) -> AppResult<()> {
        let mut table = write(&self.species)?;
        if table.values().any(|s| s.name.eq_ignore_ascii_case(&species.name)) {
            return Err(AppError::Conflict {
                resource: "species".to_string(),
                message: format!("Species {} already exists", species.name),
            });
        }
        table.insert(species.id, species.clone());
        Ok(())
    }

    async fn update_species(&self, species: &Species) -> AppResult<()> {
        let mut table = write(&self.species)?;
        if table
            .values()
            .any(|s| s.id != species.id && s.name.eq_ignore_ascii_case(&species.name))
        {
            return Err(AppError::Conflict {
                resource: "species".to_string(),
                message: format!("Species {} already exists", species.name),
            });
        }
        match table.get_mut(&species.id) {
            Some(existing) => {
                *existing = species.clone();
                Ok(())
            }
            None => Err(AppError::not_found("species", species.id)),
        }
    }

    async fn delete_species(&self, id: Uuid) -> AppResult<()> {
        let mut table = write(&self.species)?;
        if !table.contains_key(&id) {
            return Err(AppError::not_found("species", id));
        }
        if self.all_batches()?.iter().any(|b| b.species_id == id) {
            return Err(AppError::Conflict {
                resource: "species".to_string(),
                message: "Species is referenced by batches and cannot be deleted".to_string(),
            });
        }
        table.remove(&id);
        Ok(())
    }

    async fn get_species(&self, id: Uuid) -> AppResult<Option<Species>> {
        Ok(read(&self.species)?.get(&id).cloned())
    }

    async fn list_species(&self, active_only: bool) -> AppResult<Vec<Species>> {
        let mut list: Vec<Species> = read(&self.species)?
            .values()
            .filter(|s| !active_only || s.is_active)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn insert_zone(&self, zone: &Zone) -> AppResult<()> {
        write(&self.zones)?.insert(zone.id, Arc::new(Mutex::new(zone.clone())));
        Ok(())
    }

    async fn update_zone(&self, id: Uuid, patch: &LocationPatch) -> AppResult<Zone> {
        let row = self.zone_row(id)?;
        let mut zone = lock(&row)?;
        let occupied = zone.occupied;
        let mut next = zone.clone();
        apply_patch(
            &mut next.name,
            &mut next.capacity,
            &mut next.is_active,
            occupied,
            patch,
        )?;
        next.version += 1;
        next.updated_at = Utc::now();
        *zone = next.clone();
        Ok(next)
    }

    async fn delete_zone(&self, id: Uuid) -> AppResult<()> {
        let mut zones = write(&self.zones)?;
        let row = zones
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("zone", id))?;

        let bed_rows: Vec<Row<Bed>> = read(&self.beds)?.values().cloned().collect();
        for bed in &bed_rows {
            if lock(bed)?.zone_id == id {
                return Err(AppError::Conflict {
                    resource: "zone".to_string(),
                    message: "Zone still has beds".to_string(),
                });
            }
        }
        if lock(&row)?.occupied > 0 {
            return Err(AppError::Conflict {
                resource: "zone".to_string(),
                message: "Zone still holds plants".to_string(),
            });
        }
        zones.remove(&id);
        for task in write(&self.tasks)?.values_mut() {
            if task.zone_id == Some(id) {
                task.zone_id = None;
            }
        }
        Ok(())
    }

    async fn get_zone(&self, id: Uuid) -> AppResult<Option<Zone>> {
        let row = read(&self.zones)?.get(&id).cloned();
        match row {
            Some(row) => Ok(Some(lock(&row)?.clone())),
            None => Ok(None),
        }
    }

    async fn list_zones(&self) -> AppResult<Vec<Zone>> {
        let rows: Vec<Row<Zone>> = read(&self.zones)?.values().cloned().collect();
        let mut list = rows
            .iter()
            .map(|row| lock(row).map(|zone| zone.clone()))
            .collect::<AppResult<Vec<Zone>>>()?;
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn insert_bed(&self, bed: &Bed) -> AppResult<()> {
        if !read(&self.zones)?.contains_key(&bed.zone_id) {
            return Err(AppError::not_found("zone", bed.zone_id));
        }
        write(&self.beds)?.insert(bed.id, Arc::new(Mutex::new(bed.clone())));
        Ok(())
    }

    async fn update_bed(&self, id: Uuid, patch: &LocationPatch) -> AppResult<Bed> {
        let row = self.bed_row(id)?;
        let mut bed = lock(&row)?;
        let occupied = bed.occupied;
        let mut next = bed.clone();
        apply_patch(
            &mut next.name,
            &mut next.capacity,
            &mut next.is_active,
            occupied,
            patch,
        )?;
        next.version += 1;
        next.updated_at = Utc::now();
        *bed = next.clone();
        Ok(next)
    }

    async fn delete_bed(&self, id: Uuid) -> AppResult<()> {
        let mut beds = write(&self.beds)?;
        let row = beds
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("bed", id))?;
        if lock(&row)?.occupied > 0 {
            return Err(AppError::Conflict {
                resource: "bed".to_string(),
                message: "Bed still holds plants".to_string(),
            });
        }
        beds.remove(&id);
        Ok(())
    }

    async fn get_bed(&self, id: Uuid) -> AppResult<Option<Bed>> {
        let row = read(&self.beds)?.get(&id).cloned();
        match row {
            Some(row) => Ok(Some(lock(&row)?.clone())),
            None => Ok(None),
        }
    }

    async fn list_beds(&self, zone_id: Option<Uuid>) -> AppResult<Vec<Bed>> {
        let rows: Vec<Row<Bed>> = read(&self.beds)?.values().cloned().collect();
        let mut list = Vec::with_capacity(rows.len());
        for row in &rows {
            let bed = lock(row)?;
            if zone_id.map_or(true, |id| bed.zone_id == id) {
                list.push(bed.clone());
            }
        }
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn occupancy(&self, location: Location) -> AppResult<Occupancy> {
        let (capacity, occupied) = match location {
            Location::Zone(id) => {
                let row = self.zone_row(id)?;
                let zone = lock(&row)?;
                (zone.capacity, zone.occupied)
            }
            Location::Bed(id) => {
                let row = self.bed_row(id)?;
                let bed = lock(&row)?;
                (bed.capacity, bed.occupied)
            }
        };
        Ok(Occupancy {
            location,
            capacity,
            occupied,
        })
    }

    async fn apply_capacity(&self, changes: &[CapacityChange]) -> AppResult<()> {
        let rows = self.capacity_rows(changes)?;
        let mut guards = rows.lock()?;
        guards.apply(changes)
    }

    async fn next_batch_sequence(&self, pathway: Pathway, day: NaiveDate) -> AppResult<u32> {
        let mut sequences = lock(&self.sequences)?;
        let value = sequences.entry((pathway, day)).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn insert_batch(&self, batch: &Batch, changes: &[CapacityChange]) -> AppResult<()> {
        // held until the batch is visible so the species cannot be deleted meanwhile
        let species = read(&self.species)?;
        if !species.contains_key(&batch.species_id) {
            return Err(AppError::not_found("species", batch.species_id));
        }

        let rows = self.capacity_rows(changes)?;
        let mut guards = rows.lock()?;
        let mut batches = write(&self.batches)?;
        if batches.contains_key(&batch.id) {
            return Err(AppError::Conflict {
                resource: "batch".to_string(),
                message: format!("Batch {} already exists", batch.id),
            });
        }

        guards.apply(changes)?;
        batches.insert(batch.id, Arc::new(Mutex::new(batch.clone())));
        Ok(())
    }

    async fn get_batch(&self, id: Uuid) -> AppResult<Option<Batch>> {
        let row = read(&self.batches)?.get(&id).cloned();
        match row {
            Some(row) => Ok(Some(lock(&row)?.clone())),
            None => Ok(None),
        }
    }

    async fn list_batches(&self, filter: &BatchFilter) -> AppResult<(Vec<Batch>, u64)> {
        let mut matching: Vec<Batch> = self
            .all_batches()?
            .into_iter()
            .filter(|b| filter.matches(b))
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.batch_number.cmp(&a.batch_number))
        });

        let total = matching.len() as u64;
        let offset = usize::try_from(filter.pagination.offset()).unwrap_or(usize::MAX);
        let page = matching
            .into_iter()
            .skip(offset)
            .take(filter.pagination.per_page as usize)
            .collect();
        Ok((page, total))
    }

    async fn commit_batch(&self, commit: BatchCommit) -> AppResult<Batch> {
        let row = self.batch_row(commit.batch.id)?;
        let mut current = lock(&row)?;
        if current.version != commit.expected_version {
            return Err(AppError::ConcurrencyConflict {
                resource: format!("batch {}", current.id),
                attempts: 1,
            });
        }

        let rows = self.capacity_rows(&commit.capacity_changes)?;
        let mut guards = rows.lock()?;
        let mut history = write(&self.history)?;
        let mut losses = write(&self.losses)?;
        let mut measurements = write(&self.measurements)?;

        guards.apply(&commit.capacity_changes)?;

        let mut next = commit.batch;
        next.version = commit.expected_version + 1;
        if let Some(entry) = commit.history {
            history.entry(next.id).or_default().push(entry);
        }
        if let Some(record) = commit.loss {
            losses.entry(next.id).or_default().push(record);
        }
        if let Some(sample) = commit.measurement {
            measurements.entry(next.id).or_default().push(sample);
        }
        *current = next.clone();
        Ok(next)
    }

    async fn stage_history(&self, batch_id: Uuid) -> AppResult<Vec<StageHistory>> {
        Ok(read(&self.history)?
            .get(&batch_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn loss_records(&self, batch_id: Uuid) -> AppResult<Vec<LossRecord>> {
        Ok(read(&self.losses)?
            .get(&batch_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn measurements(&self, batch_id: Uuid) -> AppResult<Vec<Measurement>> {
        Ok(read(&self.measurements)?
            .get(&batch_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_measurements(&self, filter: &MeasurementFilter) -> AppResult<Vec<Measurement>> {
        let mut list: Vec<Measurement> = read(&self.measurements)?
            .values()
            .flatten()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn insert_task(&self, task: &Task) -> AppResult<()> {
        write(&self.tasks)?.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> AppResult<Option<Task>> {
        Ok(read(&self.tasks)?.get(&id).cloned())
    }

    async fn complete_task(&self, id: Uuid, completed_at: DateTime<Utc>) -> AppResult<Task> {
        let mut table = write(&self.tasks)?;
        let task = table
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("task", id))?;
        if task.is_completed {
            return Err(AppError::Conflict {
                resource: "task".to_string(),
                message: "Task is already completed".to_string(),
            });
        }
        task.is_completed = true;
        task.completed_at = Some(completed_at);
        Ok(task.clone())
    }

    async fn delete_task(&self, id: Uuid) -> AppResult<()> {
        match write(&self.tasks)?.remove(&id) {
            Some(_) => Ok(()),
            None => Err(AppError::not_found("task", id)),
        }
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> AppResult<Vec<Task>> {
        let mut list: Vec<Task> = read(&self.tasks)?
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            a.due_date
                .cmp(&b.due_date)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(list)
    }

    async fn batch_counts(&self) -> AppResult<BatchCounts> {
        let mut counts = BatchCounts::default();
        for batch in self.all_batches()? {
            counts.total += 1;
            match batch.status {
                BatchStatus::Ready => counts.ready += 1,
                BatchStatus::InProgress => counts.in_progress += 1,
                _ => {}
            }
            if !batch.is_terminal() {
                counts.live_plants += i64::from(batch.current_qty);
            }
        }
        Ok(counts)
    }

    async fn active_batches_by_zone(&self) -> AppResult<HashMap<Uuid, i64>> {
        let mut counts = HashMap::new();
        for batch in self.all_batches()? {
            if let (Some(zone_id), false) = (batch.zone_id, batch.is_terminal()) {
                *counts.entry(zone_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn count_pending_tasks(&self) -> AppResult<i64> {
        Ok(read(&self.tasks)?.values().filter(|t| !t.is_completed).count() as i64)
    }

    async fn count_measurements_since(&self, since: DateTime<Utc>) -> AppResult<i64> {
        Ok(read(&self.measurements)?
            .values()
            .flatten()
            .filter(|m| m.created_at >= since)
            .count() as i64)
    }
}
