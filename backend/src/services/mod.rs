//! Business logic services for the Plant Nursery Management Platform

use shared::{Action, Actor, Location, Resource};
use std::future::Future;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::NurseryStore;

pub mod batch;
pub mod capacity;
pub mod growth;
pub mod location;
pub mod loss;
pub mod reporting;
pub mod species;
pub mod stage;
pub mod task;

pub use batch::BatchService;
pub use capacity::CapacityLedger;
pub use growth::GrowthService;
pub use location::LocationService;
pub use loss::LossRecorder;
pub use reporting::ReportingService;
pub use species::SpeciesService;
pub use stage::StageTransitionService;
pub use task::TaskService;

/// Reject the call unless `actor` holds the permission
pub(crate) fn authorize(actor: &Actor, resource: Resource, action: Action) -> AppResult<()> {
    if actor.can(resource, action) {
        return Ok(());
    }
    tracing::warn!(
        user_id = %actor.user_id,
        role = actor.role.as_str(),
        ?resource,
        ?action,
        "permission denied"
    );
    Err(AppError::InsufficientPermissions)
}

/// Run `attempt` until it stops losing optimistic version races.
///
/// Every attempt re-reads state from scratch. After `max_attempts` the
/// conflict is returned with the number of attempts made.
pub(crate) async fn with_retry<T, F, Fut>(
    operation: &str,
    max_attempts: u32,
    mut attempt: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt().await {
            Err(AppError::ConcurrencyConflict { resource, .. }) => {
                if attempts >= max_attempts {
                    return Err(AppError::ConcurrencyConflict { resource, attempts });
                }
                tracing::debug!(operation, %resource, attempts, "version conflict, retrying");
                tokio::task::yield_now().await;
            }
            result => return result,
        }
    }
}

/// Where a batch sits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Placement {
    pub zone_id: Option<Uuid>,
    pub bed_id: Option<Uuid>,
}

impl Placement {
    pub fn location(&self) -> Option<Location> {
        match (self.bed_id, self.zone_id) {
            (Some(bed_id), _) => Some(Location::Bed(bed_id)),
            (None, Some(zone_id)) => Some(Location::Zone(zone_id)),
            (None, None) => None,
        }
    }
}

/// Check a requested zone/bed pair. A bed implies its zone.
pub(crate) async fn resolve_placement(
    store: &dyn NurseryStore,
    zone_id: Option<Uuid>,
    bed_id: Option<Uuid>,
) -> AppResult<Placement> {
    if let Some(bed_id) = bed_id {
        let bed = store
            .get_bed(bed_id)
            .await?
            .ok_or_else(|| AppError::validation("bed_id", "Bed not found"))?;
        if !bed.is_active {
            return Err(AppError::validation("bed_id", "Bed is inactive"));
        }
        if zone_id.is_some_and(|zone_id| zone_id != bed.zone_id) {
            return Err(AppError::validation(
                "zone_id",
                "Bed does not belong to the given zone",
            ));
        }
        return Ok(Placement {
            zone_id: Some(bed.zone_id),
            bed_id: Some(bed_id),
        });
    }

    if let Some(zone_id) = zone_id {
        let zone = store
            .get_zone(zone_id)
            .await?
            .ok_or_else(|| AppError::validation("zone_id", "Zone not found"))?;
        if !zone.is_active {
            return Err(AppError::validation("zone_id", "Zone is inactive"));
        }
        return Ok(Placement {
            zone_id: Some(zone_id),
            bed_id: None,
        });
    }

    Ok(Placement::default())
}

/// Map a shared validator message onto a field
pub(crate) fn check(field: &str, result: Result<(), &'static str>) -> AppResult<()> {
    result.map_err(|message| AppError::validation(field, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = with_retry("test", 3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::ConcurrencyConflict {
                resource: "batch".to_string(),
                attempts: 1,
            })
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(AppError::ConcurrencyConflict { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", 5, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::ConcurrencyConflict {
                    resource: "batch".to_string(),
                    attempts: 1,
                })
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = with_retry("test", 5, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::InvalidQuantity("negative".to_string()))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(AppError::InvalidQuantity(_))));
    }
}
