//! Loss and adjustment recorder

use chrono::Utc;
use serde::Deserialize;
use shared::{validation, Action, Actor, Batch, BatchStatus, LossRecord, Resource};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::{authorize, with_retry};
use crate::store::{BatchCommit, CapacityChange, NurseryStore};

/// Applies irreversible quantity reductions
#[derive(Clone)]
pub struct LossRecorder {
    store: Arc<dyn NurseryStore>,
    config: Arc<Config>,
}

/// Input for recording a loss
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordLossInput {
    pub quantity: i32,
    #[validate(length(min = 1, max = 500, message = "Reason must be 1-500 characters"))]
    pub reason: String,
}

impl LossRecorder {
    /// Create a new LossRecorder instance
    pub fn new(store: Arc<dyn NurseryStore>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    /// Remove `quantity` living plants from a batch.
    ///
    /// The lost plants free their capacity. When nothing is left alive and
    /// `loss.cancel_when_depleted` is set, the batch is cancelled.
    pub async fn record_loss(
        &self,
        actor: &Actor,
        batch_id: Uuid,
        input: RecordLossInput,
    ) -> AppResult<Batch> {
        authorize(actor, Resource::Loss, Action::Create)?;
        let input = RecordLossInput {
            quantity: input.quantity,
            reason: input.reason.trim().to_string(),
        };
        input.validate()?;

        let input = &input;
        let batch = with_retry("record_loss", self.config.concurrency.max_attempts, move || {
            self.try_record_loss(actor, batch_id, input)
        })
        .await?;

        tracing::info!(
            batch_id = %batch.id,
            batch_number = %batch.batch_number,
            quantity = input.quantity,
            reason = %input.reason,
            current_qty = batch.current_qty,
            loss_qty = batch.loss_qty,
            "loss recorded"
        );
        if batch.current_qty == 0 && batch.status == BatchStatus::Cancelled {
            tracing::info!(batch_id = %batch.id, "batch depleted and cancelled");
        }
        Ok(batch)
    }

    async fn try_record_loss(
        &self,
        actor: &Actor,
        batch_id: Uuid,
        input: &RecordLossInput,
    ) -> AppResult<Batch> {
        let current = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| AppError::not_found("batch", batch_id))?;
        if current.is_terminal() {
            return Err(AppError::BatchTerminal {
                batch_id,
                status: current.status,
            });
        }
        validation::validate_loss_qty(input.quantity, current.remaining_loss_allowance())
            .map_err(|message| AppError::InvalidQuantity(message.to_string()))?;

        let now = Utc::now();
        let mut next = current.clone();
        next.current_qty -= input.quantity;
        next.loss_qty += input.quantity;
        next.loss_reason = Some(input.reason.clone());
        next.updated_at = now;
        if next.current_qty == 0 && self.config.loss.cancel_when_depleted {
            next.status = BatchStatus::Cancelled;
        }

        let mut commit = BatchCommit::new(next, current.version);
        if let Some(location) = current.placement() {
            commit
                .capacity_changes
                .push(CapacityChange::Release(location, input.quantity));
        }
        commit.loss = Some(LossRecord {
            id: Uuid::new_v4(),
            batch_id,
            quantity: input.quantity,
            reason: input.reason.clone(),
            recorded_by: actor.user_id,
            created_at: now,
        });
        self.store.commit_batch(commit).await
    }

    /// Loss ledger of a batch, oldest first
    pub async fn losses(&self, actor: &Actor, batch_id: Uuid) -> AppResult<Vec<LossRecord>> {
        authorize(actor, Resource::Loss, Action::View)?;
        if self.store.get_batch(batch_id).await?.is_none() {
            return Err(AppError::not_found("batch", batch_id));
        }
        self.store.loss_records(batch_id).await
    }
}
