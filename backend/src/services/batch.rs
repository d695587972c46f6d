//! Batch entity manager: creation, queries and explicit status changes

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::{
    generate_batch_number, validation, Action, Actor, Batch, BatchStage, BatchStatus,
    LossRecord, Measurement, PaginatedResponse, Pathway, Resource, Species, StageGraph,
    StageHistory,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::{authorize, check, resolve_placement, with_retry};
use crate::store::{BatchCommit, BatchFilter, CapacityChange, NurseryStore};

/// Batch service for creating and querying batches
#[derive(Clone)]
pub struct BatchService {
    store: Arc<dyn NurseryStore>,
    config: Arc<Config>,
    stage_graph: Arc<StageGraph>,
}

/// Input for creating a batch
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBatchInput {
    pub species_id: Uuid,
    pub pathway: Pathway,
    pub initial_qty: i32,
    pub custom_name: Option<String>,
    pub zone_id: Option<Uuid>,
    pub bed_id: Option<Uuid>,
}

/// Batch with everything recorded against it
#[derive(Debug, Clone, Serialize)]
pub struct BatchDetail {
    pub batch: Batch,
    pub species: Species,
    pub stage_history: Vec<StageHistory>,
    pub losses: Vec<LossRecord>,
    pub measurements: Vec<Measurement>,
    /// Empty once the batch is terminal or its pathway is complete
    pub allowed_next_stages: Vec<BatchStage>,
}

impl BatchService {
    /// Create a new BatchService instance
    pub fn new(
        store: Arc<dyn NurseryStore>,
        config: Arc<Config>,
        stage_graph: Arc<StageGraph>,
    ) -> Self {
        Self {
            store,
            config,
            stage_graph,
        }
    }

    /// Create a batch in INITIAL, reserving capacity when a location is given.
    ///
    /// The batch and its reservation land together or not at all. A sequence
    /// number consumed by a failed creation is not reused.
    pub async fn create_batch(&self, actor: &Actor, input: CreateBatchInput) -> AppResult<Batch> {
        authorize(actor, Resource::Batch, Action::Create)?;
        check(
            "initial_qty",
            validation::validate_initial_qty(
                input.initial_qty,
                self.config.batch.min_initial_qty,
                self.config.batch.max_initial_qty,
            ),
        )?;
        let custom_name = input
            .custom_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        check(
            "custom_name",
            validation::validate_custom_name(custom_name.as_deref()),
        )?;

        let species = self
            .store
            .get_species(input.species_id)
            .await?
            .ok_or_else(|| AppError::validation("species_id", "Species not found"))?;
        if !species.is_active {
            return Err(AppError::validation("species_id", "Species is inactive"));
        }

        let placement = resolve_placement(self.store.as_ref(), input.zone_id, input.bed_id).await?;

        let now = Utc::now();
        let sequence = self
            .store
            .next_batch_sequence(input.pathway, now.date_naive())
            .await?;
        let batch = Batch {
            id: Uuid::new_v4(),
            batch_number: generate_batch_number(input.pathway, now.date_naive(), sequence),
            custom_name,
            pathway: input.pathway,
            species_id: species.id,
            initial_qty: input.initial_qty,
            current_qty: input.initial_qty,
            status: BatchStatus::Created,
            stage: BatchStage::Initial,
            is_ready: false,
            ready_date: None,
            loss_qty: 0,
            loss_reason: None,
            created_by: actor.user_id,
            zone_id: placement.zone_id,
            bed_id: placement.bed_id,
            stage_entered_at: now,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let changes: Vec<CapacityChange> = placement
            .location()
            .map(|location| CapacityChange::Reserve(location, batch.initial_qty))
            .into_iter()
            .collect();
        let batch_ref = &batch;
        let changes_ref = &changes;
        with_retry("create_batch", self.config.concurrency.max_attempts, move || {
            self.store.insert_batch(batch_ref, changes_ref)
        })
        .await?;

        tracing::info!(
            batch_id = %batch.id,
            batch_number = %batch.batch_number,
            pathway = %batch.pathway,
            initial_qty = batch.initial_qty,
            "batch created"
        );
        Ok(batch)
    }

    pub async fn get_batch(&self, actor: &Actor, batch_id: Uuid) -> AppResult<Batch> {
        authorize(actor, Resource::Batch, Action::View)?;
        self.load(batch_id).await
    }

    /// Batch together with species, history, losses and measurements
    pub async fn get_batch_detail(&self, actor: &Actor, batch_id: Uuid) -> AppResult<BatchDetail> {
        authorize(actor, Resource::Batch, Action::View)?;
        let batch = self.load(batch_id).await?;
        let species = self
            .store
            .get_species(batch.species_id)
            .await?
            .ok_or_else(|| AppError::not_found("species", batch.species_id))?;
        let stage_history = self.store.stage_history(batch_id).await?;
        let losses = self.store.loss_records(batch_id).await?;
        let measurements = self.store.measurements(batch_id).await?;
        let allowed_next_stages = if batch.is_terminal() {
            Vec::new()
        } else {
            self.stage_graph.next_stages(batch.pathway, batch.stage)
        };

        Ok(BatchDetail {
            batch,
            species,
            stage_history,
            losses,
            measurements,
            allowed_next_stages,
        })
    }

    /// Newest first, filtered and paginated
    pub async fn list_batches(
        &self,
        actor: &Actor,
        filter: &BatchFilter,
    ) -> AppResult<PaginatedResponse<Batch>> {
        authorize(actor, Resource::Batch, Action::View)?;
        let (batches, total) = self.store.list_batches(filter).await?;
        Ok(PaginatedResponse::new(batches, total, &filter.pagination))
    }

    /// Explicitly mark a batch READY, DELIVERED or CANCELLED.
    ///
    /// A terminal status gives the batch's living plants back to its location.
    pub async fn set_status(
        &self,
        actor: &Actor,
        batch_id: Uuid,
        status: BatchStatus,
    ) -> AppResult<Batch> {
        authorize(actor, Resource::Batch, Action::Edit)?;
        let batch = with_retry("set_status", self.config.concurrency.max_attempts, || {
            self.try_set_status(batch_id, status)
        })
        .await?;

        tracing::info!(
            batch_id = %batch.id,
            batch_number = %batch.batch_number,
            status = %batch.status,
            "batch status changed"
        );
        Ok(batch)
    }

    async fn try_set_status(&self, batch_id: Uuid, status: BatchStatus) -> AppResult<Batch> {
        let current = self.load(batch_id).await?;
        if current.is_terminal() {
            return Err(AppError::BatchTerminal {
                batch_id,
                status: current.status,
            });
        }
        if !current.status.can_mark(status) {
            return Err(AppError::validation(
                "status",
                format!("Cannot mark a {} batch as {}", current.status, status),
            ));
        }

        let mut next = current.clone();
        next.status = status;
        next.updated_at = Utc::now();

        let mut commit = BatchCommit::new(next, current.version);
        if status.is_terminal() {
            if let Some(location) = current.placement() {
                commit
                    .capacity_changes
                    .push(CapacityChange::Release(location, current.current_qty));
            }
        }
        self.store.commit_batch(commit).await
    }

    async fn load(&self, batch_id: Uuid) -> AppResult<Batch> {
        self.store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| AppError::not_found("batch", batch_id))
    }
}
