//! Reporting service for dashboard and utilization views

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use shared::{utilization_percent, Action, Actor, DashboardStats, Resource, ZoneUtilization};
use std::sync::Arc;

use crate::config::Config;
use crate::error::AppResult;
use crate::services::authorize;
use crate::store::NurseryStore;

/// Reporting service for generating analytics
#[derive(Clone)]
pub struct ReportingService {
    store: Arc<dyn NurseryStore>,
    config: Arc<Config>,
}

impl ReportingService {
    /// Create a new ReportingService instance
    pub fn new(store: Arc<dyn NurseryStore>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    /// Capacity use per zone, busiest first
    pub async fn zone_utilization(&self, actor: &Actor) -> AppResult<Vec<ZoneUtilization>> {
        authorize(actor, Resource::Analytics, Action::View)?;
        let zones = self.store.list_zones().await?;
        let active = self.store.active_batches_by_zone().await?;
        let threshold = Decimal::from(self.config.reporting.utilization_alert_percent);

        let mut rows: Vec<ZoneUtilization> = zones
            .into_iter()
            .map(|zone| {
                let utilization = utilization_percent(zone.capacity, zone.occupied);
                ZoneUtilization {
                    zone_id: zone.id,
                    active_batches: active.get(&zone.id).copied().unwrap_or(0),
                    zone_name: zone.name,
                    capacity: zone.capacity,
                    occupied: zone.occupied,
                    over_threshold: utilization >= threshold,
                    utilization_percentage: utilization,
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.utilization_percentage
                .cmp(&a.utilization_percentage)
                .then_with(|| a.zone_name.cmp(&b.zone_name))
        });
        Ok(rows)
    }

    /// Headline counts for the dashboard
    pub async fn dashboard_stats(&self, actor: &Actor) -> AppResult<DashboardStats> {
        authorize(actor, Resource::Analytics, Action::View)?;
        let counts = self.store.batch_counts().await?;
        let active_species = self.store.list_species(true).await?.len() as i64;
        let zones = self.store.list_zones().await?;
        let pending_tasks = self.store.count_pending_tasks().await?;
        let weekly_measurements = self
            .store
            .count_measurements_since(Utc::now() - Duration::days(7))
            .await?;

        let capacity: i64 = zones.iter().map(|z| i64::from(z.capacity)).sum();
        let occupied: i64 = zones.iter().map(|z| i64::from(z.occupied)).sum();
        let zones_utilization = if capacity > 0 {
            (Decimal::from(occupied) * Decimal::ONE_HUNDRED / Decimal::from(capacity)).round_dp(1)
        } else {
            Decimal::ZERO
        };

        Ok(DashboardStats {
            total_batches: counts.total,
            ready_batches: counts.ready,
            in_progress_batches: counts.in_progress,
            total_plants: counts.live_plants,
            active_species,
            zones_utilization,
            pending_tasks,
            weekly_measurements,
        })
    }
}
