//! Plant Nursery Management Platform - batch lifecycle engine
//!
//! Batches, their stage transitions, losses and growth measurements, with
//! zone and bed capacity accounted atomically alongside every change.

use shared::StageGraph;
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod services;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, AppResult};

use services::{
    BatchService, CapacityLedger, GrowthService, LocationService, LossRecorder, ReportingService,
    SpeciesService, StageTransitionService, TaskService,
};
use store::{MemoryStore, NurseryStore, PgStore};

/// Application state shared across services
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NurseryStore>,
    pub config: Arc<Config>,
    pub stage_graph: Arc<StageGraph>,
}

impl AppState {
    pub fn new(store: Arc<dyn NurseryStore>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
            stage_graph: Arc::new(StageGraph::standard()),
        }
    }

    /// State backed by the in-memory arena
    pub fn in_memory(config: Config) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// State backed by PostgreSQL; migrations run in development
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        tracing::info!(environment = %config.environment, "connecting to database");
        let store = PgStore::connect(&config.database).await?;
        if config.environment == "development" {
            store.migrate().await?;
            tracing::info!("migrations completed");
        }
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn capacity(&self) -> CapacityLedger {
        CapacityLedger::new(self.store.clone(), self.config.concurrency.max_attempts)
    }

    pub fn species(&self) -> SpeciesService {
        SpeciesService::new(self.store.clone())
    }

    pub fn locations(&self) -> LocationService {
        LocationService::new(self.store.clone())
    }

    pub fn batches(&self) -> BatchService {
        BatchService::new(
            self.store.clone(),
            self.config.clone(),
            self.stage_graph.clone(),
        )
    }

    pub fn stages(&self) -> StageTransitionService {
        StageTransitionService::new(
            self.store.clone(),
            self.config.clone(),
            self.stage_graph.clone(),
        )
    }

    pub fn losses(&self) -> LossRecorder {
        LossRecorder::new(self.store.clone(), self.config.clone())
    }

    pub fn growth(&self) -> GrowthService {
        GrowthService::new(self.store.clone(), self.config.clone())
    }

    pub fn reporting(&self) -> ReportingService {
        ReportingService::new(self.store.clone(), self.config.clone())
    }

    pub fn tasks(&self) -> TaskService {
        TaskService::new(self.store.clone())
    }
}
