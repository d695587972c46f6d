//! Capacity ledger tests
//!
//! Covers reservation against bed and zone capacity, release clamping and
//! the occupied <= capacity invariant.

mod common;

use common::*;
use nursery_backend::services::location::UpdateLocationInput;
use nursery_backend::AppError;
use proptest::prelude::*;
use shared::Location;

// ============================================================================
// Unit Tests
// ============================================================================

mod unit_tests {
    use super::*;

    /// 850 of 900 on a bed fits, another 100 does not
    #[tokio::test]
    async fn test_bed_reservation_rejects_overflow() {
        let state = state();
        let actor = manager();
        let zone = seed_zone(&state, 1000).await;
        let bed = seed_bed(&state, zone.id, 900).await;
        let ledger = state.capacity();

        ledger
            .reserve(&actor, Location::Bed(bed.id), 850)
            .await
            .unwrap();

        let err = ledger
            .reserve(&actor, Location::Bed(bed.id), 100)
            .await
            .unwrap_err();
        match err {
            AppError::CapacityExceeded {
                location,
                capacity,
                occupied,
                requested,
            } => {
                assert_eq!(location, Location::Bed(bed.id));
                assert_eq!((capacity, occupied, requested), (900, 850, 100));
            }
            other => panic!("expected CapacityExceeded, got {other:?}"),
        }

        let occupancy = ledger
            .get_occupancy(&actor, Location::Bed(bed.id))
            .await
            .unwrap();
        assert_eq!(occupancy.occupied, 850);
    }

    #[tokio::test]
    async fn test_huge_reservation_does_not_wrap() {
        let state = state();
        let actor = manager();
        let zone = seed_zone(&state, 1000).await;
        let bed = seed_bed(&state, zone.id, 900).await;
        let ledger = state.capacity();
        ledger
            .reserve(&actor, Location::Bed(bed.id), 10)
            .await
            .unwrap();

        let err = ledger
            .reserve(&actor, Location::Bed(bed.id), i32::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded { requested: i32::MAX, .. }));

        let occupancy = ledger
            .get_occupancy(&actor, Location::Bed(bed.id))
            .await
            .unwrap();
        assert_eq!(occupancy.occupied, 10);
    }

    /// Beds whose capacities add up past the zone still cannot overfill it
    #[tokio::test]
    async fn test_zone_capacity_enforced_across_beds() {
        let state = state();
        let actor = manager();
        let zone = seed_zone(&state, 1000).await;
        let bed_a = seed_bed(&state, zone.id, 900).await;
        let bed_b = seed_bed(&state, zone.id, 900).await;
        let ledger = state.capacity();

        ledger
            .reserve(&actor, Location::Bed(bed_a.id), 800)
            .await
            .unwrap();
        let err = ledger
            .reserve(&actor, Location::Bed(bed_b.id), 300)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::CapacityExceeded { location: Location::Zone(id), .. } if id == zone.id
        ));

        // the failed bed reservation left nothing behind
        let bed_b = ledger
            .get_occupancy(&actor, Location::Bed(bed_b.id))
            .await
            .unwrap();
        assert_eq!(bed_b.occupied, 0);
        let zone = ledger
            .get_occupancy(&actor, Location::Zone(zone.id))
            .await
            .unwrap();
        assert_eq!(zone.occupied, 800);
    }

    #[tokio::test]
    async fn test_release_twice_never_goes_negative() {
        let state = state();
        let actor = manager();
        let zone = seed_zone(&state, 100).await;
        let ledger = state.capacity();
        let location = Location::Zone(zone.id);

        ledger.reserve(&actor, location, 30).await.unwrap();
        ledger.release(&actor, location, 30).await.unwrap();
        ledger.release(&actor, location, 30).await.unwrap();

        let occupancy = ledger.get_occupancy(&actor, location).await.unwrap();
        assert_eq!(occupancy.occupied, 0);
    }

    #[tokio::test]
    async fn test_non_positive_reservation_is_rejected() {
        let state = state();
        let actor = manager();
        let zone = seed_zone(&state, 100).await;
        let err = state
            .capacity()
            .reserve(&actor, Location::Zone(zone.id), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidQuantity(_)));
    }

    #[tokio::test]
    async fn test_inactive_bed_rejects_reservation() {
        let state = state();
        let actor = manager();
        let zone = seed_zone(&state, 100).await;
        let bed = seed_bed(&state, zone.id, 50).await;
        state
            .locations()
            .update_bed(
                &actor,
                bed.id,
                UpdateLocationInput {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = state
            .capacity()
            .reserve(&actor, Location::Bed(bed.id), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_capacity_cannot_shrink_below_occupancy() {
        let state = state();
        let actor = manager();
        let zone = seed_zone(&state, 100).await;
        state
            .capacity()
            .reserve(&actor, Location::Zone(zone.id), 60)
            .await
            .unwrap();

        let err = state
            .locations()
            .update_zone(
                &actor,
                zone.id,
                UpdateLocationInput {
                    capacity: Some(50),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "capacity"));

        let zone = state
            .locations()
            .update_zone(
                &actor,
                zone.id,
                UpdateLocationInput {
                    capacity: Some(60),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(zone.capacity, 60);
    }

    #[tokio::test]
    async fn test_occupied_zone_cannot_be_deleted() {
        let state = state();
        let actor = manager();
        let zone = seed_zone(&state, 100).await;
        state
            .capacity()
            .reserve(&actor, Location::Zone(zone.id), 1)
            .await
            .unwrap();

        let err = state
            .locations()
            .delete_zone(&actor, zone.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_field_officer_cannot_reserve() {
        let state = state();
        let zone = seed_zone(&state, 100).await;
        let err = state
            .capacity()
            .reserve(&field_officer(), Location::Zone(zone.id), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientPermissions));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod property_tests {
    use super::*;

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(bool, i32),
        Release(bool, i32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (any::<bool>(), 1..400i32).prop_map(|(bed, q)| Op::Reserve(bed, q)),
            (any::<bool>(), 1..400i32).prop_map(|(bed, q)| Op::Release(bed, q)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// No sequence of reserves and releases breaks occupied <= capacity
        #[test]
        fn prop_occupancy_stays_within_capacity(ops in prop::collection::vec(op(), 1..30)) {
            let rt = runtime();
            rt.block_on(async {
                let state = state();
                let actor = manager();
                let zone = seed_zone(&state, 1000).await;
                let bed = seed_bed(&state, zone.id, 600).await;
                let ledger = state.capacity();

                for op in ops {
                    let (bed_side, result) = match op {
                        Op::Reserve(on_bed, q) => {
                            let location = if on_bed { Location::Bed(bed.id) } else { Location::Zone(zone.id) };
                            (on_bed, ledger.reserve(&actor, location, q).await)
                        }
                        Op::Release(on_bed, q) => {
                            let location = if on_bed { Location::Bed(bed.id) } else { Location::Zone(zone.id) };
                            (on_bed, ledger.release(&actor, location, q).await)
                        }
                    };
                    if let Err(err) = result {
                        assert!(matches!(err, AppError::CapacityExceeded { .. }), "bed={bed_side}: {err:?}");
                    }

                    let bed_now = ledger.get_occupancy(&actor, Location::Bed(bed.id)).await.unwrap();
                    let zone_now = ledger.get_occupancy(&actor, Location::Zone(zone.id)).await.unwrap();
                    assert!(bed_now.occupied >= 0 && bed_now.occupied <= bed_now.capacity);
                    assert!(zone_now.occupied >= 0 && zone_now.occupied <= zone_now.capacity);
                }
            });
        }

        /// Repeating a release never drives occupancy below zero
        #[test]
        fn prop_release_is_idempotent_at_zero(reserved in 0..500i32, released in 1..1000i32) {
            let rt = runtime();
            rt.block_on(async {
                let state = state();
                let actor = manager();
                let zone = seed_zone(&state, 500).await;
                let location = Location::Zone(zone.id);
                let ledger = state.capacity();

                if reserved > 0 {
                    ledger.reserve(&actor, location, reserved).await.unwrap();
                }
                ledger.release(&actor, location, released).await.unwrap();
                ledger.release(&actor, location, released).await.unwrap();

                let occupancy = ledger.get_occupancy(&actor, location).await.unwrap();
                assert_eq!(occupancy.occupied, (reserved - 2 * released).max(0));
            });
        }
    }
}
