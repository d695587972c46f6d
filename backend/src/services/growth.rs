//! Growth measurement aggregator and readiness evaluation

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    evaluate_readiness, validation, Action, Actor, Batch, Measurement, ReadinessResult, Resource,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::{authorize, check, with_retry};
use crate::store::{BatchCommit, MeasurementFilter, NurseryStore};

/// Records growth samples and derives readiness from them
#[derive(Clone)]
pub struct GrowthService {
    store: Arc<dyn NurseryStore>,
    config: Arc<Config>,
}

/// Input for recording a measurement, in canonical units
#[derive(Debug, Clone, Deserialize)]
pub struct RecordMeasurementInput {
    /// Average girth in millimetres
    pub girth_mm: Decimal,
    /// Average height in centimetres
    pub height_cm: Decimal,
    pub sample_size: i32,
    pub notes: Option<String>,
}

impl GrowthService {
    /// Create a new GrowthService instance
    pub fn new(store: Arc<dyn NurseryStore>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    /// Append a measurement and re-evaluate readiness.
    ///
    /// The first time the window averages meet both species targets the
    /// batch becomes ready, stamped with this measurement's time. Later
    /// regressions never clear it.
    pub async fn record_measurement(
        &self,
        actor: &Actor,
        batch_id: Uuid,
        mut input: RecordMeasurementInput,
    ) -> AppResult<Measurement> {
        authorize(actor, Resource::Measurement, Action::Create)?;
        // stored as NUMERIC(8, 2)
        input.girth_mm = input.girth_mm.round_dp(2);
        input.height_cm = input.height_cm.round_dp(2);
        check("girth_mm", validation::validate_girth_mm(input.girth_mm))?;
        check("height_cm", validation::validate_height_cm(input.height_cm))?;
        check("notes", validation::validate_notes(input.notes.as_deref()))?;

        let input = &input;
        let (batch, measurement, became_ready) =
            with_retry("record_measurement", self.config.concurrency.max_attempts, move || {
                self.try_record_measurement(actor, batch_id, input)
            })
            .await?;

        tracing::debug!(
            batch_id = %batch.id,
            measurement_id = %measurement.id,
            girth_mm = %measurement.girth_mm,
            height_cm = %measurement.height_cm,
            sample_size = measurement.sample_size,
            "measurement recorded"
        );
        if became_ready {
            tracing::info!(
                batch_id = %batch.id,
                batch_number = %batch.batch_number,
                ready_date = ?batch.ready_date,
                "batch reached species targets"
            );
        }
        Ok(measurement)
    }

    async fn try_record_measurement(
        &self,
        actor: &Actor,
        batch_id: Uuid,
        input: &RecordMeasurementInput,
    ) -> AppResult<(Batch, Measurement, bool)> {
        let current = self.load(batch_id).await?;
        if current.is_terminal() {
            return Err(AppError::BatchTerminal {
                batch_id,
                status: current.status,
            });
        }
        check(
            "sample_size",
            validation::validate_sample_size(
                input.sample_size,
                current.current_qty,
                self.config.measurement.max_sample_size,
            ),
        )?;

        let species = self
            .store
            .get_species(current.species_id)
            .await?
            .ok_or_else(|| AppError::not_found("species", current.species_id))?;

        let now = Utc::now();
        let measurement = Measurement {
            id: Uuid::new_v4(),
            batch_id,
            user_id: actor.user_id,
            girth_mm: input.girth_mm,
            height_cm: input.height_cm,
            sample_size: input.sample_size,
            notes: input.notes.clone(),
            created_at: now,
        };

        let mut samples = self.store.measurements(batch_id).await?;
        samples.push(measurement.clone());
        let readiness = evaluate_readiness(
            &current,
            &species,
            &samples,
            self.config.readiness.window(),
            self.config.readiness.grace_period_days,
            now,
        );

        let mut next = current.clone();
        let became_ready = !current.is_ready && readiness.meets_target;
        if became_ready {
            next.is_ready = true;
            next.ready_date = next.ready_date.or(Some(measurement.created_at));
        }
        next.updated_at = now;

        let mut commit = BatchCommit::new(next, current.version);
        commit.measurement = Some(measurement.clone());
        let batch = self.store.commit_batch(commit).await?;
        Ok((batch, measurement, became_ready))
    }

    /// Read-only readiness and growth analytics for a batch
    pub async fn compute_readiness(
        &self,
        actor: &Actor,
        batch_id: Uuid,
    ) -> AppResult<ReadinessResult> {
        authorize(actor, Resource::Measurement, Action::View)?;
        let batch = self.load(batch_id).await?;
        let species = self
            .store
            .get_species(batch.species_id)
            .await?
            .ok_or_else(|| AppError::not_found("species", batch.species_id))?;
        let samples = self.store.measurements(batch_id).await?;

        Ok(evaluate_readiness(
            &batch,
            &species,
            &samples,
            self.config.readiness.window(),
            self.config.readiness.grace_period_days,
            Utc::now(),
        ))
    }

    /// Measurements of a batch, oldest first
    pub async fn measurements(&self, actor: &Actor, batch_id: Uuid) -> AppResult<Vec<Measurement>> {
        authorize(actor, Resource::Measurement, Action::View)?;
        self.load(batch_id).await?;
        self.store.measurements(batch_id).await
    }

    /// Measurements across batches, newest first
    pub async fn list_measurements(
        &self,
        actor: &Actor,
        filter: &MeasurementFilter,
    ) -> AppResult<Vec<Measurement>> {
        authorize(actor, Resource::Measurement, Action::View)?;
        if let Some(range) = &filter.date_range {
            if range.start > range.end {
                return Err(AppError::validation(
                    "date_range",
                    "Start date must not be after end date",
                ));
            }
        }
        self.store.list_measurements(filter).await
    }

    async fn load(&self, batch_id: Uuid) -> AppResult<Batch> {
        self.store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| AppError::not_found("batch", batch_id))
    }
}
