//! Stage transition state machine

use chrono::Utc;
use serde::Deserialize;
use shared::{
    validation, Action, Actor, Batch, BatchStage, BatchStatus, Resource, StageGraph,
    StageHistory,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::{authorize, check, resolve_placement, with_retry, Placement};
use crate::store::{BatchCommit, CapacityChange, NurseryStore};

/// Moves batches along their pathway's stage graph
#[derive(Clone)]
pub struct StageTransitionService {
    store: Arc<dyn NurseryStore>,
    config: Arc<Config>,
    stage_graph: Arc<StageGraph>,
}

/// Input for a stage transition
#[derive(Debug, Clone, Deserialize)]
pub struct TransitionInput {
    pub to_stage: BatchStage,
    /// Plants moved; at most the living quantity
    pub quantity: i32,
    pub notes: Option<String>,
    /// New zone when the stage change also moves the batch
    pub zone_id: Option<Uuid>,
    /// New bed when the stage change also moves the batch
    pub bed_id: Option<Uuid>,
}

impl StageTransitionService {
    /// Create a new StageTransitionService instance
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

    /// Advance a batch to `input.to_stage`.
    ///
    /// With a destination, the living plants move with the batch: the old
    /// location is released and the new one reserved in the same commit.
    pub async fn transition(
        &self,
        actor: &Actor,
        batch_id: Uuid,
        input: TransitionInput,
    ) -> AppResult<Batch> {
        authorize(actor, Resource::StageTransition, Action::Create)?;
        check("notes", validation::validate_notes(input.notes.as_deref()))?;

        let destination = if input.zone_id.is_some() || input.bed_id.is_some() {
            Some(resolve_placement(self.store.as_ref(), input.zone_id, input.bed_id).await?)
        } else {
            None
        };

        let input = &input;
        let (batch, from_stage) =
            with_retry("transition", self.config.concurrency.max_attempts, move || {
                self.try_transition(actor, batch_id, input, destination)
            })
            .await?;

        tracing::info!(
            batch_id = %batch.id,
            batch_number = %batch.batch_number,
            from = %from_stage,
            to = %batch.stage,
            quantity = input.quantity,
            "stage transition recorded"
        );
        Ok(batch)
    }

    async fn try_transition(
        &self,
        actor: &Actor,
        batch_id: Uuid,
        input: &TransitionInput,
        destination: Option<Placement>,
    ) -> AppResult<(Batch, BatchStage)> {
        let current = self.load(batch_id).await?;
        if current.is_terminal() {
            return Err(AppError::BatchTerminal {
                batch_id,
                status: current.status,
            });
        }
        if !self
            .stage_graph
            .is_allowed(current.pathway, current.stage, input.to_stage)
        {
            return Err(AppError::InvalidTransition {
                pathway: current.pathway,
                from: current.stage,
                to: input.to_stage,
            });
        }
        validation::validate_transition_qty(input.quantity, current.current_qty)
            .map_err(|message| AppError::InvalidQuantity(message.to_string()))?;

        let now = Utc::now();
        let mut next = current.clone();
        next.stage = input.to_stage;
        next.stage_entered_at = now;
        next.updated_at = now;
        if next.status == BatchStatus::Created {
            next.status = BatchStatus::InProgress;
        }

        let mut capacity_changes = Vec::new();
        if let Some(destination) = destination {
            let target = destination.location();
            if target.is_some() && target != current.placement() {
                if let Some(old) = current.placement() {
                    capacity_changes.push(CapacityChange::Release(old, current.current_qty));
                }
                if let Some(new) = target {
                    capacity_changes.push(CapacityChange::Reserve(new, current.current_qty));
                }
                next.zone_id = destination.zone_id;
                next.bed_id = destination.bed_id;
            }
        }

        let history = StageHistory {
            id: Uuid::new_v4(),
            batch_id,
            from_stage: Some(current.stage),
            to_stage: input.to_stage,
            quantity: input.quantity,
            notes: input.notes.clone(),
            recorded_by: actor.user_id,
            created_at: now,
        };

        let mut commit = BatchCommit::new(next, current.version);
        commit.capacity_changes = capacity_changes;
        commit.history = Some(history);
        let batch = self.store.commit_batch(commit).await?;
        Ok((batch, current.stage))
    }

    /// Stages the batch may move to next
    pub async fn allowed_transitions(
        &self,
        actor: &Actor,
        batch_id: Uuid,
    ) -> AppResult<Vec<BatchStage>> {
        authorize(actor, Resource::Batch, Action::View)?;
        let batch = self.load(batch_id).await?;
        if batch.is_terminal() {
            return Ok(Vec::new());
        }
        Ok(self.stage_graph.next_stages(batch.pathway, batch.stage))
    }

    /// Transition ledger of a batch, oldest first
    pub async fn history(&self, actor: &Actor, batch_id: Uuid) -> AppResult<Vec<StageHistory>> {
        authorize(actor, Resource::StageTransition, Action::View)?;
        self.load(batch_id).await?;
        self.store.stage_history(batch_id).await
    }

    async fn load(&self, batch_id: Uuid) -> AppResult<Batch> {
        self.store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| AppError::not_found("batch", batch_id))
    }
}
