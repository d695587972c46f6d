//! PostgreSQL store
//!
//! Every trait method runs in a single transaction. Capacity reservations
//! are conditional updates, so the check and the write are one statement.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::{
    Batch, BatchStage, Bed, Location, LossRecord, Measurement, Occupancy, ParseEnumError, Pathway,
    Species, StageHistory, Task, Zone,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::{
    apply_patch, BatchCommit, BatchCounts, BatchFilter, CapacityChange, LocationPatch,
    MeasurementFilter, NurseryStore, TaskFilter,
};
use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};

const TERMINAL_STATUSES: &str = "('DELIVERED', 'CANCELLED')";

const BATCH_COLUMNS: &str = "id, batch_number, custom_name, pathway, species_id, initial_qty, \
     current_qty, status, stage, is_ready, ready_date, loss_qty, loss_reason, created_by, \
     zone_id, bed_id, stage_entered_at, version, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Open a connection pool
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.url)
            .await?;
        Ok(Self::new(db))
    }

    /// Run pending schema migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }
}

/// Translate lock and constraint failures into domain errors
fn db_error(err: sqlx::Error, resource: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            // serialization_failure, deadlock_detected
            Some("40001") | Some("40P01") => {
                return AppError::ConcurrencyConflict {
                    resource: resource.to_string(),
                    attempts: 1,
                }
            }
            Some("23505") => {
                return AppError::Conflict {
                    resource: resource.to_string(),
                    message: format!("{} already exists", resource),
                }
            }
            Some("23503") => {
                return AppError::Conflict {
                    resource: resource.to_string(),
                    message: format!("{} is still referenced", resource),
                }
            }
            _ => {}
        }
    }
    AppError::DatabaseError(err)
}

fn parse<T: FromStr<Err = ParseEnumError>>(value: &str) -> AppResult<T> {
    value
        .parse()
        .map_err(|e: ParseEnumError| AppError::Internal(e.to_string()))
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, FromRow)]
struct SpeciesRow {
    id: Uuid,
    name: String,
    scientific_name: Option<String>,
    description: Option<String>,
    category: String,
    target_girth_mm: Decimal,
    target_height_cm: Decimal,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SpeciesRow> for Species {
    type Error = AppError;

    fn try_from(row: SpeciesRow) -> AppResult<Self> {
        Ok(Species {
            id: row.id,
            name: row.name,
            scientific_name: row.scientific_name,
            description: row.description,
            category: parse(&row.category)?,
            target_girth_mm: row.target_girth_mm,
            target_height_cm: row.target_height_cm,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ZoneRow {
    id: Uuid,
    name: String,
    capacity: i32,
    occupied: i32,
    is_active: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ZoneRow> for Zone {
    fn from(row: ZoneRow) -> Self {
        Zone {
            id: row.id,
            name: row.name,
            capacity: row.capacity,
            occupied: row.occupied,
            is_active: row.is_active,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct BedRow {
    id: Uuid,
    zone_id: Uuid,
    name: String,
    capacity: i32,
    occupied: i32,
    is_active: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BedRow> for Bed {
    fn from(row: BedRow) -> Self {
        Bed {
            id: row.id,
            zone_id: row.zone_id,
            name: row.name,
            capacity: row.capacity,
            occupied: row.occupied,
            is_active: row.is_active,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct BatchRow {
    id: Uuid,
    batch_number: String,
    custom_name: Option<String>,
    pathway: String,
    species_id: Uuid,
    initial_qty: i32,
    current_qty: i32,
    status: String,
    stage: String,
    is_ready: bool,
    ready_date: Option<DateTime<Utc>>,
    loss_qty: i32,
    loss_reason: Option<String>,
    created_by: Uuid,
    zone_id: Option<Uuid>,
    bed_id: Option<Uuid>,
    stage_entered_at: DateTime<Utc>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BatchRow> for Batch {
    type Error = AppError;

    fn try_from(row: BatchRow) -> AppResult<Self> {
        Ok(Batch {
            id: row.id,
            batch_number: row.batch_number,
            custom_name: row.custom_name,
            pathway: parse(&row.pathway)?,
            species_id: row.species_id,
            initial_qty: row.initial_qty,
            current_qty: row.current_qty,
            status: parse(&row.status)?,
            stage: parse(&row.stage)?,
            is_ready: row.is_ready,
            ready_date: row.ready_date,
            loss_qty: row.loss_qty,
            loss_reason: row.loss_reason,
            created_by: row.created_by,
            zone_id: row.zone_id,
            bed_id: row.bed_id,
            stage_entered_at: row.stage_entered_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct StageHistoryRow {
    id: Uuid,
    batch_id: Uuid,
    from_stage: Option<String>,
    to_stage: String,
    quantity: i32,
    notes: Option<String>,
    recorded_by: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<StageHistoryRow> for StageHistory {
    type Error = AppError;

    fn try_from(row: StageHistoryRow) -> AppResult<Self> {
        Ok(StageHistory {
            id: row.id,
            batch_id: row.batch_id,
            from_stage: row.from_stage.as_deref().map(parse::<BatchStage>).transpose()?,
            to_stage: parse(&row.to_stage)?,
            quantity: row.quantity,
            notes: row.notes,
            recorded_by: row.recorded_by,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LossRow {
    id: Uuid,
    batch_id: Uuid,
    quantity: i32,
    reason: String,
    recorded_by: Uuid,
    created_at: DateTime<Utc>,
}

impl From<LossRow> for LossRecord {
    fn from(row: LossRow) -> Self {
        LossRecord {
            id: row.id,
            batch_id: row.batch_id,
            quantity: row.quantity,
            reason: row.reason,
            recorded_by: row.recorded_by,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MeasurementRow {
    id: Uuid,
    batch_id: Uuid,
    user_id: Uuid,
    girth_mm: Decimal,
    height_cm: Decimal,
    sample_size: i32,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MeasurementRow> for Measurement {
    fn from(row: MeasurementRow) -> Self {
        Measurement {
            id: row.id,
            batch_id: row.batch_id,
            user_id: row.user_id,
            girth_mm: row.girth_mm,
            height_cm: row.height_cm,
            sample_size: row.sample_size,
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: Uuid,
    user_id: Uuid,
    task_type: String,
    title: String,
    description: Option<String>,
    due_date: DateTime<Utc>,
    is_completed: bool,
    batch_id: Option<Uuid>,
    zone_id: Option<Uuid>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> AppResult<Self> {
        Ok(Task {
            id: row.id,
            user_id: row.user_id,
            task_type: parse(&row.task_type)?,
            title: row.title,
            description: row.description,
            due_date: row.due_date,
            is_completed: row.is_completed,
            batch_id: row.batch_id,
            zone_id: row.zone_id,
            created_by: row.created_by,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SlotRow {
    capacity: i32,
    occupied: i32,
    is_active: bool,
}

// ============================================================================
// Capacity
// ============================================================================

fn table_of(location: Location) -> &'static str {
    match location {
        Location::Zone(_) => "zones",
        Location::Bed(_) => "beds",
    }
}

/// Conditionally add `quantity` to a row; nothing is written when it does not fit
async fn reserve_row(
    tx: &mut Transaction<'_, Postgres>,
    location: Location,
    quantity: i32,
) -> AppResult<()> {
    let table = table_of(location);
    let updated = sqlx::query(&format!(
        "UPDATE {} SET occupied = occupied + $2, version = version + 1, updated_at = NOW() \
         WHERE id = $1 AND is_active AND occupied::BIGINT + $2::BIGINT <= capacity",
        table
    ))
    .bind(location.id())
    .bind(quantity)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error(e, table))?;

    if updated.rows_affected() == 1 {
        return Ok(());
    }

    let slot = sqlx::query_as::<_, SlotRow>(&format!(
        "SELECT capacity, occupied, is_active FROM {} WHERE id = $1",
        table
    ))
    .bind(location.id())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| db_error(e, table))?
    .ok_or_else(|| AppError::NotFound(location.to_string()))?;

    if !slot.is_active {
        return Err(AppError::validation(
            location.kind(),
            format!("{} is inactive and cannot accept plants", location),
        ));
    }
    tracing::warn!(
        location = %location,
        capacity = slot.capacity,
        occupied = slot.occupied,
        requested = quantity,
        "capacity reservation rejected"
    );
    Err(AppError::CapacityExceeded {
        location,
        capacity: slot.capacity,
        occupied: slot.occupied,
        requested: quantity,
    })
}

/// Subtract `quantity` from a locked row, clamping at zero
async fn release_row(
    tx: &mut Transaction<'_, Postgres>,
    location: Location,
    quantity: i32,
) -> AppResult<()> {
    let table = table_of(location);
    let occupied = sqlx::query_scalar::<_, i32>(&format!(
        "SELECT occupied FROM {} WHERE id = $1 FOR UPDATE",
        table
    ))
    .bind(location.id())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| db_error(e, table))?
    .ok_or_else(|| AppError::NotFound(location.to_string()))?;

    let remaining = if quantity > occupied {
        tracing::warn!(
            location = %location,
            occupied,
            released = quantity,
            "release exceeds occupancy, clamping to zero"
        );
        0
    } else {
        occupied - quantity
    };

    sqlx::query(&format!(
        "UPDATE {} SET occupied = $2, version = version + 1, updated_at = NOW() WHERE id = $1",
        table
    ))
    .bind(location.id())
    .bind(remaining)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error(e, table))?;
    Ok(())
}

/// Apply capacity changes inside `tx`, zone before bed as in the memory store
async fn apply_changes(
    tx: &mut Transaction<'_, Postgres>,
    changes: &[CapacityChange],
) -> AppResult<()> {
    for change in changes {
        let quantity = change.quantity();
        if quantity < 0 {
            return Err(AppError::InvalidQuantity(format!(
                "capacity change on {} must not be negative",
                change.location()
            )));
        }
        if quantity == 0 {
            continue;
        }

        let mut chain = Vec::with_capacity(2);
        if let Location::Bed(bed_id) = change.location() {
            let zone_id = sqlx::query_scalar::<_, Uuid>("SELECT zone_id FROM beds WHERE id = $1")
                .bind(bed_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| db_error(e, "bed"))?
                .ok_or_else(|| AppError::not_found("bed", bed_id))?;
            chain.push(Location::Zone(zone_id));
        }
        chain.push(change.location());

        for target in chain {
            match change {
                CapacityChange::Reserve(..) => reserve_row(tx, target, quantity).await?,
                CapacityChange::Release(..) => release_row(tx, target, quantity).await?,
            }
        }
    }
    Ok(())
}

fn push_batch_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &BatchFilter) {
    query.push(" WHERE 1 = 1");
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(stage) = filter.stage {
        query.push(" AND stage = ").push_bind(stage.as_str());
    }
    if let Some(pathway) = filter.pathway {
        query.push(" AND pathway = ").push_bind(pathway.as_str());
    }
    if let Some(species_id) = filter.species_id {
        query.push(" AND species_id = ").push_bind(species_id);
    }
    if let Some(zone_id) = filter.zone_id {
        query.push(" AND zone_id = ").push_bind(zone_id);
    }
    if let Some(from) = filter.created_from {
        query.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        query.push(" AND created_at <= ").push_bind(to);
    }
    if let Some(term) = filter.search_term() {
        let pattern = format!("%{}%", term);
        query
            .push(" AND (LOWER(batch_number) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(COALESCE(custom_name, '')) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_measurement_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &MeasurementFilter) {
    query.push(" WHERE 1 = 1");
    if let Some(batch_id) = filter.batch_id {
        query.push(" AND batch_id = ").push_bind(batch_id);
    }
    if let Some(user_id) = filter.user_id {
        query.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(range) = &filter.date_range {
        query
            .push(" AND (created_at AT TIME ZONE 'UTC')::DATE BETWEEN ")
            .push_bind(range.start)
            .push(" AND ")
            .push_bind(range.end);
    }
}

fn push_task_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &TaskFilter) {
    query.push(" WHERE 1 = 1");
    if let Some(task_type) = filter.task_type {
        query.push(" AND task_type = ").push_bind(task_type.as_str());
    }
    if let Some(completed) = filter.completed {
        query.push(" AND is_completed = ").push_bind(completed);
    }
    if let Some(user_id) = filter.user_id {
        query.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(batch_id) = filter.batch_id {
        query.push(" AND batch_id = ").push_bind(batch_id);
    }
    if let Some(zone_id) = filter.zone_id {
        query.push(" AND zone_id = ").push_bind(zone_id);
    }
    if let Some(range) = &filter.due_on {
        query
            .push(" AND (due_date AT TIME ZONE 'UTC')::DATE BETWEEN ")
            .push_bind(range.start)
            .push(" AND ")
            .push_bind(range.end);
    }
    if let Some(from) = filter.due_from {
        query.push(" AND due_date >= ").push_bind(from);
    }
    if let Some(to) = filter.due_to {
        query.push(" AND due_date <= ").push_bind(to);
    }
    if let Some(term) = filter.search_term() {
        let pattern = format!("%{}%", term);
        query
            .push(" AND (LOWER(title) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(COALESCE(description, '')) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl NurseryStore for PgStore {
    async fn insert_species(&self, species: &Species) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO species (
                id, name, scientific_name, description, category,
                target_girth_mm, target_height_cm, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(species.id)
        .bind(&species.name)
        .bind(&species.scientific_name)
        .bind(&species.description)
        .bind(species.category.as_str())
        .bind(species.target_girth_mm)
        .bind(species.target_height_cm)
        .bind(species.is_active)
        .bind(species.created_at)
        .bind(species.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| db_error(e, "species"))?;
        Ok(())
    }

    async fn update_species(&self, species: &Species) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE species
            SET name = $2, scientific_name = $3, description = $4, category = $5,
                target_girth_mm = $6, target_height_cm = $7, is_active = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(species.id)
        .bind(&species.name)
        .bind(&species.scientific_name)
        .bind(&species.description)
        .bind(species.category.as_str())
        .bind(species.target_girth_mm)
        .bind(species.target_height_cm)
        .bind(species.is_active)
        .bind(species.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| db_error(e, "species"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("species", species.id));
        }
        Ok(())
    }

    async fn delete_species(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let in_use = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM batches WHERE species_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if in_use {
            return Err(AppError::Conflict {
                resource: "species".to_string(),
                message: "Species is referenced by batches and cannot be deleted".to_string(),
            });
        }

        let result = sqlx::query("DELETE FROM species WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, "species"))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("species", id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_species(&self, id: Uuid) -> AppResult<Option<Species>> {
        sqlx::query_as::<_, SpeciesRow>("SELECT * FROM species WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(Species::try_from)
            .transpose()
    }

    async fn list_species(&self, active_only: bool) -> AppResult<Vec<Species>> {
        let rows = sqlx::query_as::<_, SpeciesRow>(
            "SELECT * FROM species WHERE ($1 = FALSE OR is_active) ORDER BY name",
        )
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Species::try_from).collect()
    }

    async fn insert_zone(&self, zone: &Zone) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO zones (id, name, capacity, occupied, is_active, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(zone.id)
        .bind(&zone.name)
        .bind(zone.capacity)
        .bind(zone.occupied)
        .bind(zone.is_active)
        .bind(zone.version)
        .bind(zone.created_at)
        .bind(zone.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| db_error(e, "zone"))?;
        Ok(())
    }

    async fn update_zone(&self, id: Uuid, patch: &LocationPatch) -> AppResult<Zone> {
        let mut tx = self.db.begin().await?;

        let mut zone: Zone =
            sqlx::query_as::<_, ZoneRow>("SELECT * FROM zones WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::not_found("zone", id))?
                .into();
        let occupied = zone.occupied;
        apply_patch(
            &mut zone.name,
            &mut zone.capacity,
            &mut zone.is_active,
            occupied,
            patch,
        )?;

        let updated = sqlx::query_as::<_, ZoneRow>(
            r#"
            UPDATE zones
            SET name = $2, capacity = $3, is_active = $4, version = version + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&zone.name)
        .bind(zone.capacity)
        .bind(zone.is_active)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated.into())
    }

    async fn delete_zone(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let occupied =
            sqlx::query_scalar::<_, i32>("SELECT occupied FROM zones WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::not_found("zone", id))?;

        let has_beds =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM beds WHERE zone_id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if has_beds {
            return Err(AppError::Conflict {
                resource: "zone".to_string(),
                message: "Zone still has beds".to_string(),
            });
        }
        if occupied > 0 {
            return Err(AppError::Conflict {
                resource: "zone".to_string(),
                message: "Zone still holds plants".to_string(),
            });
        }

        sqlx::query("DELETE FROM zones WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, "zone"))?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_zone(&self, id: Uuid) -> AppResult<Option<Zone>> {
        let row = sqlx::query_as::<_, ZoneRow>("SELECT * FROM zones WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Zone::from))
    }

    async fn list_zones(&self) -> AppResult<Vec<Zone>> {
        let rows = sqlx::query_as::<_, ZoneRow>("SELECT * FROM zones ORDER BY name")
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Zone::from).collect())
    }

    async fn insert_bed(&self, bed: &Bed) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO beds (id, zone_id, name, capacity, occupied, is_active, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(bed.id)
        .bind(bed.zone_id)
        .bind(&bed.name)
        .bind(bed.capacity)
        .bind(bed.occupied)
        .bind(bed.is_active)
        .bind(bed.version)
        .bind(bed.created_at)
        .bind(bed.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| db_error(e, "bed"))?;
        Ok(())
    }

    async fn update_bed(&self, id: Uuid, patch: &LocationPatch) -> AppResult<Bed> {
        let mut tx = self.db.begin().await?;

        let mut bed: Bed =
            sqlx::query_as::<_, BedRow>("SELECT * FROM beds WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::not_found("bed", id))?
                .into();
        let occupied = bed.occupied;
        apply_patch(
            &mut bed.name,
            &mut bed.capacity,
            &mut bed.is_active,
            occupied,
            patch,
        )?;

        let updated = sqlx::query_as::<_, BedRow>(
            r#"
            UPDATE beds
            SET name = $2, capacity = $3, is_active = $4, version = version + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&bed.name)
        .bind(bed.capacity)
        .bind(bed.is_active)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated.into())
    }

    async fn delete_bed(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let occupied =
            sqlx::query_scalar::<_, i32>("SELECT occupied FROM beds WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::not_found("bed", id))?;
        if occupied > 0 {
            return Err(AppError::Conflict {
                resource: "bed".to_string(),
                message: "Bed still holds plants".to_string(),
            });
        }

        sqlx::query("DELETE FROM beds WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, "bed"))?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_bed(&self, id: Uuid) -> AppResult<Option<Bed>> {
        let row = sqlx::query_as::<_, BedRow>("SELECT * FROM beds WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Bed::from))
    }

    async fn list_beds(&self, zone_id: Option<Uuid>) -> AppResult<Vec<Bed>> {
        let rows = sqlx::query_as::<_, BedRow>(
            "SELECT * FROM beds WHERE ($1::UUID IS NULL OR zone_id = $1) ORDER BY name",
        )
        .bind(zone_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Bed::from).collect())
    }

    async fn occupancy(&self, location: Location) -> AppResult<Occupancy> {
        let slot = sqlx::query_as::<_, SlotRow>(&format!(
            "SELECT capacity, occupied, is_active FROM {} WHERE id = $1",
            table_of(location)
        ))
        .bind(location.id())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(location.to_string()))?;

        Ok(Occupancy {
            location,
            capacity: slot.capacity,
            occupied: slot.occupied,
        })
    }

    async fn apply_capacity(&self, changes: &[CapacityChange]) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        apply_changes(&mut tx, changes).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn next_batch_sequence(&self, pathway: Pathway, day: NaiveDate) -> AppResult<u32> {
        let value = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO batch_sequences (pathway, day, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (pathway, day)
            DO UPDATE SET last_value = batch_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(pathway.as_str())
        .bind(day)
        .fetch_one(&self.db)
        .await
        .map_err(|e| db_error(e, "batch sequence"))?;

        u32::try_from(value)
            .map_err(|_| AppError::Internal(format!("invalid batch sequence {}", value)))
    }

    async fn insert_batch(&self, batch: &Batch, changes: &[CapacityChange]) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        apply_changes(&mut tx, changes).await?;

        sqlx::query(&format!(
            "INSERT INTO batches ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
            BATCH_COLUMNS
        ))
        .bind(batch.id)
        .bind(&batch.batch_number)
        .bind(&batch.custom_name)
        .bind(batch.pathway.as_str())
        .bind(batch.species_id)
        .bind(batch.initial_qty)
        .bind(batch.current_qty)
        .bind(batch.status.as_str())
        .bind(batch.stage.as_str())
        .bind(batch.is_ready)
        .bind(batch.ready_date)
        .bind(batch.loss_qty)
        .bind(&batch.loss_reason)
        .bind(batch.created_by)
        .bind(batch.zone_id)
        .bind(batch.bed_id)
        .bind(batch.stage_entered_at)
        .bind(batch.version)
        .bind(batch.created_at)
        .bind(batch.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error(e, "batch"))?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_batch(&self, id: Uuid) -> AppResult<Option<Batch>> {
        sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {} FROM batches WHERE id = $1",
            BATCH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .map(Batch::try_from)
        .transpose()
    }

    async fn list_batches(&self, filter: &BatchFilter) -> AppResult<(Vec<Batch>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM batches");
        push_batch_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.db).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM batches", BATCH_COLUMNS));
        push_batch_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, batch_number DESC LIMIT ")
            .push_bind(i64::from(filter.pagination.per_page))
            .push(" OFFSET ")
            .push_bind(i64::try_from(filter.pagination.offset()).unwrap_or(i64::MAX));

        let rows: Vec<BatchRow> = select.build_query_as().fetch_all(&self.db).await?;
        let batches = rows
            .into_iter()
            .map(Batch::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((batches, u64::try_from(total).unwrap_or(0)))
    }

    async fn commit_batch(&self, commit: BatchCommit) -> AppResult<Batch> {
        let mut tx = self.db.begin().await?;
        let batch = &commit.batch;

        let updated = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            UPDATE batches
            SET custom_name = $3, current_qty = $4, status = $5, stage = $6, is_ready = $7,
                ready_date = $8, loss_qty = $9, loss_reason = $10, zone_id = $11, bed_id = $12,
                stage_entered_at = $13, updated_at = $14, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            BATCH_COLUMNS
        ))
        .bind(batch.id)
        .bind(commit.expected_version)
        .bind(&batch.custom_name)
        .bind(batch.current_qty)
        .bind(batch.status.as_str())
        .bind(batch.stage.as_str())
        .bind(batch.is_ready)
        .bind(batch.ready_date)
        .bind(batch.loss_qty)
        .bind(&batch.loss_reason)
        .bind(batch.zone_id)
        .bind(batch.bed_id)
        .bind(batch.stage_entered_at)
        .bind(batch.updated_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error(e, "batch"))?;

        let updated = match updated {
            Some(row) => Batch::try_from(row)?,
            None => {
                let exists = sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS(SELECT 1 FROM batches WHERE id = $1)",
                )
                .bind(batch.id)
                .fetch_one(&mut *tx)
                .await?;
                return Err(if exists {
                    AppError::ConcurrencyConflict {
                        resource: format!("batch {}", batch.id),
                        attempts: 1,
                    }
                } else {
                    AppError::not_found("batch", batch.id)
                });
            }
        };

        apply_changes(&mut tx, &commit.capacity_changes).await?;

        if let Some(entry) = &commit.history {
            sqlx::query(
                r#"
                INSERT INTO stage_history (id, batch_id, from_stage, to_stage, quantity, notes, recorded_by, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(entry.id)
            .bind(entry.batch_id)
            .bind(entry.from_stage.map(|s| s.as_str()))
            .bind(entry.to_stage.as_str())
            .bind(entry.quantity)
            .bind(&entry.notes)
            .bind(entry.recorded_by)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(record) = &commit.loss {
            sqlx::query(
                r#"
                INSERT INTO loss_records (id, batch_id, quantity, reason, recorded_by, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(record.id)
            .bind(record.batch_id)
            .bind(record.quantity)
            .bind(&record.reason)
            .bind(record.recorded_by)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(sample) = &commit.measurement {
            sqlx::query(
                r#"
                INSERT INTO measurements (id, batch_id, user_id, girth_mm, height_cm, sample_size, notes, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(sample.id)
            .bind(sample.batch_id)
            .bind(sample.user_id)
            .bind(sample.girth_mm)
            .bind(sample.height_cm)
            .bind(sample.sample_size)
            .bind(&sample.notes)
            .bind(sample.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn stage_history(&self, batch_id: Uuid) -> AppResult<Vec<StageHistory>> {
        let rows = sqlx::query_as::<_, StageHistoryRow>(
            "SELECT * FROM stage_history WHERE batch_id = $1 ORDER BY created_at",
        )
        .bind(batch_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(StageHistory::try_from).collect()
    }

    async fn loss_records(&self, batch_id: Uuid) -> AppResult<Vec<LossRecord>> {
        let rows = sqlx::query_as::<_, LossRow>(
            "SELECT * FROM loss_records WHERE batch_id = $1 ORDER BY created_at",
        )
        .bind(batch_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(LossRecord::from).collect())
    }

    async fn measurements(&self, batch_id: Uuid) -> AppResult<Vec<Measurement>> {
        let rows = sqlx::query_as::<_, MeasurementRow>(
            "SELECT * FROM measurements WHERE batch_id = $1 ORDER BY created_at",
        )
        .bind(batch_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Measurement::from).collect())
    }

    async fn list_measurements(&self, filter: &MeasurementFilter) -> AppResult<Vec<Measurement>> {
        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM measurements");
        push_measurement_filters(&mut select, filter);
        select.push(" ORDER BY created_at DESC");
        let rows: Vec<MeasurementRow> = select.build_query_as().fetch_all(&self.db).await?;
        Ok(rows.into_iter().map(Measurement::from).collect())
    }

    async fn insert_task(&self, task: &Task) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, user_id, task_type, title, description, due_date, is_completed,
                batch_id, zone_id, created_by, created_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(task.id)
        .bind(task.user_id)
        .bind(task.task_type.as_str())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.due_date)
        .bind(task.is_completed)
        .bind(task.batch_id)
        .bind(task.zone_id)
        .bind(task.created_by)
        .bind(task.created_at)
        .bind(task.completed_at)
        .execute(&self.db)
        .await
        .map_err(|e| db_error(e, "task"))?;
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> AppResult<Option<Task>> {
        sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(Task::try_from)
            .transpose()
    }

    async fn complete_task(&self, id: Uuid, completed_at: DateTime<Utc>) -> AppResult<Task> {
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE tasks
            SET is_completed = TRUE, completed_at = $2
            WHERE id = $1 AND NOT is_completed
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(completed_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error(e, "task"))?;

        let task = match updated {
            Some(row) => Task::try_from(row)?,
            None => {
                let exists =
                    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM tasks WHERE id = $1)")
                        .bind(id)
                        .fetch_one(&mut *tx)
                        .await?;
                if !exists {
                    return Err(AppError::not_found("task", id));
                }
                return Err(AppError::Conflict {
                    resource: "task".to_string(),
                    message: "Task is already completed".to_string(),
                });
            }
        };

        tx.commit().await?;
        Ok(task)
    }

    async fn delete_task(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| db_error(e, "task"))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("task", id));
        }
        Ok(())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> AppResult<Vec<Task>> {
        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM tasks");
        push_task_filters(&mut select, filter);
        select.push(" ORDER BY due_date, created_at");
        let rows: Vec<TaskRow> = select.build_query_as().fetch_all(&self.db).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn batch_counts(&self) -> AppResult<BatchCounts> {
        let (total, ready, in_progress, live_plants) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(&format!(
                r#"
                SELECT COUNT(*),
                       COUNT(*) FILTER (WHERE status = 'READY'),
                       COUNT(*) FILTER (WHERE status = 'IN_PROGRESS'),
                       COALESCE(SUM(current_qty) FILTER (WHERE status NOT IN {}), 0)::BIGINT
                FROM batches
                "#,
                TERMINAL_STATUSES
            ))
            .fetch_one(&self.db)
            .await?;

        Ok(BatchCounts {
            total,
            ready,
            in_progress,
            live_plants,
        })
    }

    async fn active_batches_by_zone(&self) -> AppResult<HashMap<Uuid, i64>> {
        let rows = sqlx::query_as::<_, (Uuid, i64)>(&format!(
            r#"
            SELECT zone_id, COUNT(*)
            FROM batches
            WHERE zone_id IS NOT NULL AND status NOT IN {}
            GROUP BY zone_id
            "#,
            TERMINAL_STATUSES
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn count_pending_tasks(&self) -> AppResult<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks WHERE NOT is_completed")
                .fetch_one(&self.db)
                .await?;
        Ok(count)
    }

    async fn count_measurements_since(&self, since: DateTime<Utc>) -> AppResult<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM measurements WHERE created_at >= $1")
                .bind(since)
                .fetch_one(&self.db)
                .await?;
        Ok(count)
    }
}
