//! Batch entity manager tests
//!
//! Creation, numbering, placement, queries and explicit status changes.

mod common;

use chrono::Utc;
use common::*;
use nursery_backend::store::BatchFilter;
use nursery_backend::AppError;
use shared::{BatchStage, BatchStatus, Location, Pagination, Pathway};

// ============================================================================
// Creation
// ============================================================================

mod creation_tests {
    use super::*;

    #[tokio::test]
    async fn test_new_purchasing_batch_starts_initial() {
        let state = state();
        let batch = seed_batch(&state, Pathway::Purchasing, 100).await;

        assert_eq!(batch.status, BatchStatus::Created);
        assert_eq!(batch.stage, BatchStage::Initial);
        assert_eq!(batch.initial_qty, 100);
        assert_eq!(batch.current_qty, 100);
        assert_eq!(batch.loss_qty, 0);
        assert!(!batch.is_ready);
        assert!(batch.ready_date.is_none());
        assert!(batch.zone_id.is_none() && batch.bed_id.is_none());
    }

    #[tokio::test]
    async fn test_batch_number_encodes_pathway_date_and_sequence() {
        let state = state();
        let species = seed_species(&state).await;
        let actor = manager();
        let today = Utc::now().format("%y%m%d").to_string();

        let first = state
            .batches()
            .create_batch(&actor, batch_input(species.id, Pathway::SeedGermination, 10))
            .await
            .unwrap();
        let second = state
            .batches()
            .create_batch(&actor, batch_input(species.id, Pathway::SeedGermination, 10))
            .await
            .unwrap();
        let cutting = state
            .batches()
            .create_batch(&actor, batch_input(species.id, Pathway::CuttingGermination, 10))
            .await
            .unwrap();

        assert_eq!(first.batch_number, format!("SED-{today}-0001"));
        assert_eq!(second.batch_number, format!("SED-{today}-0002"));
        // sequences are scoped per pathway
        assert_eq!(cutting.batch_number, format!("CUT-{today}-0001"));
    }

    #[tokio::test]
    async fn test_initial_quantity_bounds() {
        let state = state();
        let species = seed_species(&state).await;
        let actor = manager();

        for qty in [0, -3, 10_001] {
            let err = state
                .batches()
                .create_batch(&actor, batch_input(species.id, Pathway::Purchasing, qty))
                .await
                .unwrap_err();
            assert!(
                matches!(err, AppError::Validation { ref field, .. } if field == "initial_qty"),
                "qty {qty}: {err:?}"
            );
        }

        let max = state
            .batches()
            .create_batch(&actor, batch_input(species.id, Pathway::Purchasing, 10_000))
            .await
            .unwrap();
        assert_eq!(max.current_qty, 10_000);
    }

    #[tokio::test]
    async fn test_unknown_or_inactive_species_is_rejected() {
        let state = state();
        let actor = manager();

        let err = state
            .batches()
            .create_batch(&actor, batch_input(uuid::Uuid::new_v4(), Pathway::Purchasing, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "species_id"));

        let species = seed_species(&state).await;
        state
            .species()
            .update_species(
                &actor,
                species.id,
                nursery_backend::services::species::UpdateSpeciesInput {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let err = state
            .batches()
            .create_batch(&actor, batch_input(species.id, Pathway::Purchasing, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "species_id"));
    }

    #[tokio::test]
    async fn test_custom_name_length() {
        let state = state();
        let species = seed_species(&state).await;
        let mut input = batch_input(species.id, Pathway::Purchasing, 5);
        input.custom_name = Some("x".repeat(101));

        let err = state
            .batches()
            .create_batch(&manager(), input)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "custom_name"));
    }

    #[tokio::test]
    async fn test_bed_placement_reserves_bed_and_zone() {
        let state = state();
        let zone = seed_zone(&state, 1000).await;
        let bed = seed_bed(&state, zone.id, 900).await;
        let batch = seed_batch_in_bed(&state, &bed, 300).await;

        assert_eq!(batch.bed_id, Some(bed.id));
        assert_eq!(batch.zone_id, Some(zone.id));

        let ledger = state.capacity();
        let actor = manager();
        let bed_now = ledger.get_occupancy(&actor, Location::Bed(bed.id)).await.unwrap();
        let zone_now = ledger.get_occupancy(&actor, Location::Zone(zone.id)).await.unwrap();
        assert_eq!(bed_now.occupied, 300);
        assert_eq!(zone_now.occupied, 300);
    }

    #[tokio::test]
    async fn test_bed_outside_given_zone_is_rejected() {
        let state = state();
        let zone = seed_zone(&state, 1000).await;
        let other = seed_zone(&state, 1000).await;
        let bed = seed_bed(&state, zone.id, 900).await;
        let species = seed_species(&state).await;

        let mut input = batch_input(species.id, Pathway::Purchasing, 5);
        input.zone_id = Some(other.id);
        input.bed_id = Some(bed.id);
        let err = state
            .batches()
            .create_batch(&manager(), input)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "zone_id"));
    }

    /// A failed reservation leaves no batch and no occupancy behind
    #[tokio::test]
    async fn test_capacity_failure_persists_nothing() {
        let state = state();
        let actor = manager();
        let zone = seed_zone(&state, 100).await;
        let species = seed_species(&state).await;

        let mut input = batch_input(species.id, Pathway::Purchasing, 150);
        input.zone_id = Some(zone.id);
        let err = state
            .batches()
            .create_batch(&actor, input)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded { requested: 150, .. }));

        let listed = state
            .batches()
            .list_batches(&actor, &BatchFilter::default())
            .await
            .unwrap();
        assert_eq!(listed.pagination.total_items, 0);
        let occupancy = state
            .capacity()
            .get_occupancy(&actor, Location::Zone(zone.id))
            .await
            .unwrap();
        assert_eq!(occupancy.occupied, 0);
    }

    #[tokio::test]
    async fn test_field_officer_cannot_create_batches() {
        let state = state();
        let species = seed_species(&state).await;
        let err = state
            .batches()
            .create_batch(&field_officer(), batch_input(species.id, Pathway::Purchasing, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientPermissions));
    }

    #[tokio::test]
    async fn test_species_with_batches_cannot_be_deleted() {
        let state = state();
        let actor = manager();
        let batch = seed_batch(&state, Pathway::Purchasing, 5).await;

        let err = state
            .species()
            .delete_species(&actor, batch.species_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }
}

// ============================================================================
// Queries
// ============================================================================

mod query_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let state = state();
        let actor = manager();
        let species = seed_species(&state).await;
        for _ in 0..12 {
            state
                .batches()
                .create_batch(&actor, batch_input(species.id, Pathway::SeedGermination, 5))
                .await
                .unwrap();
        }
        let mut named = batch_input(species.id, Pathway::Purchasing, 5);
        named.custom_name = Some("Mahogany block".to_string());
        state.batches().create_batch(&actor, named).await.unwrap();

        let page = state
            .batches()
            .list_batches(&actor, &BatchFilter::default())
            .await
            .unwrap();
        assert_eq!(page.data.len(), 10);
        assert_eq!(page.pagination.total_items, 13);
        assert_eq!(page.pagination.total_pages, 2);

        let second = state
            .batches()
            .list_batches(
                &actor,
                &BatchFilter {
                    pagination: Pagination::new(2, 10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(second.data.len(), 3);

        let seedlings = state
            .batches()
            .list_batches(
                &actor,
                &BatchFilter {
                    pathway: Some(Pathway::SeedGermination),
                    pagination: Pagination::new(1, 50),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(seedlings.pagination.total_items, 12);

        let searched = state
            .batches()
            .list_batches(
                &actor,
                &BatchFilter {
                    search: Some("mahogany".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(searched.data.len(), 1);
        assert_eq!(searched.data[0].pathway, Pathway::Purchasing);
    }

    #[tokio::test]
    async fn test_detail_lists_allowed_next_stages() {
        let state = state();
        let batch = seed_batch(&state, Pathway::OutSourcing, 20).await;

        let detail = state
            .batches()
            .get_batch_detail(&field_officer(), batch.id)
            .await
            .unwrap();
        assert_eq!(detail.batch.id, batch.id);
        assert_eq!(detail.species.id, batch.species_id);
        assert!(detail.stage_history.is_empty());
        assert_eq!(detail.allowed_next_stages, vec![BatchStage::RePotting]);
    }

    #[tokio::test]
    async fn test_missing_batch_is_not_found() {
        let state = state();
        let err = state
            .batches()
            .get_batch(&manager(), uuid::Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}

// ============================================================================
// Status
// ============================================================================

mod status_tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_then_delivered_releases_capacity() {
        let state = state();
        let actor = manager();
        let zone = seed_zone(&state, 1000).await;
        let bed = seed_bed(&state, zone.id, 500).await;
        let batch = seed_batch_in_bed(&state, &bed, 200).await;

        let ready = state
            .batches()
            .set_status(&actor, batch.id, BatchStatus::Ready)
            .await
            .unwrap();
        assert_eq!(ready.status, BatchStatus::Ready);

        let delivered = state
            .batches()
            .set_status(&actor, batch.id, BatchStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.status, BatchStatus::Delivered);

        let ledger = state.capacity();
        assert_eq!(
            ledger.get_occupancy(&actor, Location::Bed(bed.id)).await.unwrap().occupied,
            0
        );
        assert_eq!(
            ledger.get_occupancy(&actor, Location::Zone(zone.id)).await.unwrap().occupied,
            0
        );
    }

    #[tokio::test]
    async fn test_delivered_requires_ready() {
        let state = state();
        let batch = seed_batch(&state, Pathway::Purchasing, 10).await;
        let err = state
            .batches()
            .set_status(&manager(), batch.id, BatchStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "status"));
    }

    #[tokio::test]
    async fn test_terminal_batch_rejects_status_change() {
        let state = state();
        let actor = manager();
        let batch = seed_batch(&state, Pathway::Purchasing, 10).await;
        state
            .batches()
            .set_status(&actor, batch.id, BatchStatus::Cancelled)
            .await
            .unwrap();

        let err = state
            .batches()
            .set_status(&actor, batch.id, BatchStatus::Ready)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::BatchTerminal { status: BatchStatus::Cancelled, .. }
        ));
    }

    #[tokio::test]
    async fn test_version_advances_on_every_commit() {
        let state = state();
        let actor = manager();
        let batch = seed_batch(&state, Pathway::Purchasing, 10).await;
        assert_eq!(batch.version, 0);

        let ready = state
            .batches()
            .set_status(&actor, batch.id, BatchStatus::Ready)
            .await
            .unwrap();
        assert_eq!(ready.version, 1);
    }
}
