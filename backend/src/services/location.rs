//! Zone and bed management

use chrono::Utc;
use serde::Deserialize;
use shared::{validation, Action, Actor, Bed, Resource, Zone};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::{authorize, check};
use crate::store::{LocationPatch, NurseryStore};

/// Location service for zones and the beds they own
#[derive(Clone)]
pub struct LocationService {
    store: Arc<dyn NurseryStore>,
}

/// Input for creating a zone
#[derive(Debug, Clone, Deserialize)]
pub struct CreateZoneInput {
    pub name: String,
    pub capacity: i32,
}

/// Input for creating a bed inside a zone
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBedInput {
    pub zone_id: Uuid,
    pub name: String,
    pub capacity: i32,
}

/// Input for editing a zone or bed
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLocationInput {
    pub name: Option<String>,
    pub capacity: Option<i32>,
    pub is_active: Option<bool>,
}

impl UpdateLocationInput {
    fn into_patch(self) -> AppResult<LocationPatch> {
        if let Some(name) = &self.name {
            check("name", validation::validate_location_name(name))?;
        }
        if let Some(capacity) = self.capacity {
            check("capacity", validation::validate_capacity(capacity))?;
        }
        Ok(LocationPatch {
            name: self.name.map(|name| name.trim().to_string()),
            capacity: self.capacity,
            is_active: self.is_active,
        })
    }
}

impl LocationService {
    /// Create a new LocationService instance
    pub fn new(store: Arc<dyn NurseryStore>) -> Self {
        Self { store }
    }

    // ========================================================================
    // Zones
    // ========================================================================

    pub async fn create_zone(&self, actor: &Actor, input: CreateZoneInput) -> AppResult<Zone> {
        authorize(actor, Resource::Zone, Action::Create)?;
        check("name", validation::validate_location_name(&input.name))?;
        check("capacity", validation::validate_capacity(input.capacity))?;

        let now = Utc::now();
        let zone = Zone {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            capacity: input.capacity,
            occupied: 0,
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_zone(&zone).await?;

        tracing::info!(zone_id = %zone.id, capacity = zone.capacity, "zone created");
        Ok(zone)
    }

    /// Edit a zone; capacity can never drop below what is already placed
    pub async fn update_zone(
        &self,
        actor: &Actor,
        zone_id: Uuid,
        input: UpdateLocationInput,
    ) -> AppResult<Zone> {
        authorize(actor, Resource::Zone, Action::Edit)?;
        let patch = input.into_patch()?;
        self.store.update_zone(zone_id, &patch).await
    }

    pub async fn delete_zone(&self, actor: &Actor, zone_id: Uuid) -> AppResult<()> {
        authorize(actor, Resource::Zone, Action::Delete)?;
        self.store.delete_zone(zone_id).await?;
        tracing::info!(%zone_id, "zone deleted");
        Ok(())
    }

    pub async fn get_zone(&self, actor: &Actor, zone_id: Uuid) -> AppResult<Zone> {
        authorize(actor, Resource::Zone, Action::View)?;
        self.store
            .get_zone(zone_id)
            .await?
            .ok_or_else(|| AppError::not_found("zone", zone_id))
    }

    pub async fn list_zones(&self, actor: &Actor) -> AppResult<Vec<Zone>> {
        authorize(actor, Resource::Zone, Action::View)?;
        self.store.list_zones().await
    }

    // ========================================================================
    // Beds
    // ========================================================================

    /// Create a bed in an existing, active zone
    pub async fn create_bed(&self, actor: &Actor, input: CreateBedInput) -> AppResult<Bed> {
        authorize(actor, Resource::Bed, Action::Create)?;
        check("name", validation::validate_location_name(&input.name))?;
        check("capacity", validation::validate_capacity(input.capacity))?;

        let zone = self
            .store
            .get_zone(input.zone_id)
            .await?
            .ok_or_else(|| AppError::validation("zone_id", "Zone not found"))?;
        if !zone.is_active {
            return Err(AppError::validation("zone_id", "Zone is inactive"));
        }

        let now = Utc::now();
        let bed = Bed {
            id: Uuid::new_v4(),
            zone_id: zone.id,
            name: input.name.trim().to_string(),
            capacity: input.capacity,
            occupied: 0,
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_bed(&bed).await?;

        tracing::info!(bed_id = %bed.id, zone_id = %bed.zone_id, capacity = bed.capacity, "bed created");
        Ok(bed)
    }

    pub async fn update_bed(
        &self,
        actor: &Actor,
        bed_id: Uuid,
        input: UpdateLocationInput,
    ) -> AppResult<Bed> {
        authorize(actor, Resource::Bed, Action::Edit)?;
        let patch = input.into_patch()?;
        self.store.update_bed(bed_id, &patch).await
    }

    pub async fn delete_bed(&self, actor: &Actor, bed_id: Uuid) -> AppResult<()> {
        authorize(actor, Resource::Bed, Action::Delete)?;
        self.store.delete_bed(bed_id).await?;
        tracing::info!(%bed_id, "bed deleted");
        Ok(())
    }

    pub async fn get_bed(&self, actor: &Actor, bed_id: Uuid) -> AppResult<Bed> {
        authorize(actor, Resource::Bed, Action::View)?;
        self.store
            .get_bed(bed_id)
            .await?
            .ok_or_else(|| AppError::not_found("bed", bed_id))
    }

    /// Beds, optionally limited to one zone
    pub async fn list_beds(&self, actor: &Actor, zone_id: Option<Uuid>) -> AppResult<Vec<Bed>> {
        authorize(actor, Resource::Bed, Action::View)?;
        self.store.list_beds(zone_id).await
    }
}
