//! Capacity ledger for zones and beds

use shared::{Action, Actor, Location, Occupancy, Resource};
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::services::{authorize, with_retry};
use crate::store::{CapacityChange, NurseryStore};

/// Occupancy accounting against declared capacity
#[derive(Clone)]
pub struct CapacityLedger {
    store: Arc<dyn NurseryStore>,
    max_attempts: u32,
}

fn resource_of(location: Location) -> Resource {
    match location {
        Location::Zone(_) => Resource::Zone,
        Location::Bed(_) => Resource::Bed,
    }
}

impl CapacityLedger {
    /// Create a new CapacityLedger instance
    pub fn new(store: Arc<dyn NurseryStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    /// Reserve `quantity` plants on a location.
    ///
    /// A bed reservation also counts against its zone; both must have room.
    pub async fn reserve(&self, actor: &Actor, location: Location, quantity: i32) -> AppResult<()> {
        authorize(actor, resource_of(location), Action::Edit)?;
        if quantity <= 0 {
            return Err(AppError::InvalidQuantity(
                "Reserved quantity must be positive".to_string(),
            ));
        }

        let changes = [CapacityChange::Reserve(location, quantity)];
        with_retry("reserve", self.max_attempts, || {
            self.store.apply_capacity(&changes)
        })
        .await?;

        tracing::debug!(%location, quantity, "capacity reserved");
        Ok(())
    }

    /// Give back `quantity` plants. Over-release clamps at zero.
    pub async fn release(&self, actor: &Actor, location: Location, quantity: i32) -> AppResult<()> {
        authorize(actor, resource_of(location), Action::Edit)?;
        if quantity < 0 {
            return Err(AppError::InvalidQuantity(
                "Released quantity must not be negative".to_string(),
            ));
        }
        if quantity == 0 {
            return Ok(());
        }

        let changes = [CapacityChange::Release(location, quantity)];
        with_retry("release", self.max_attempts, || {
            self.store.apply_capacity(&changes)
        })
        .await?;

        tracing::debug!(%location, quantity, "capacity released");
        Ok(())
    }

    pub async fn get_occupancy(&self, actor: &Actor, location: Location) -> AppResult<Occupancy> {
        authorize(actor, resource_of(location), Action::View)?;
        self.store.occupancy(location).await
    }
}
