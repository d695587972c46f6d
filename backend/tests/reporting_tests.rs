//! Reporting and permission tests

mod common;

use chrono::{Duration, Utc};
use common::*;
use nursery_backend::services::growth::RecordMeasurementInput;
use nursery_backend::services::task::CreateTaskInput;
use nursery_backend::AppError;
use shared::{BatchStatus, Pathway, TaskType};

#[tokio::test]
async fn test_zone_utilization_flags_busy_zones() {
    let state = state();
    let actor = manager();
    let busy = seed_zone(&state, 100).await;
    let quiet = seed_zone(&state, 1000).await;
    let busy_bed = seed_bed(&state, busy.id, 100).await;
    let quiet_bed = seed_bed(&state, quiet.id, 1000).await;
    seed_batch_in_bed(&state, &busy_bed, 95).await;
    seed_batch_in_bed(&state, &quiet_bed, 100).await;

    let rows = state.reporting().zone_utilization(&actor).await.unwrap();
    assert_eq!(rows.len(), 2);

    let busy_row = rows.iter().find(|r| r.zone_id == busy.id).unwrap();
    assert_eq!(busy_row.occupied, 95);
    assert_eq!(busy_row.utilization_percentage, dec("95"));
    assert_eq!(busy_row.active_batches, 1);
    assert!(busy_row.over_threshold);

    let quiet_row = rows.iter().find(|r| r.zone_id == quiet.id).unwrap();
    assert_eq!(quiet_row.utilization_percentage, dec("10"));
    assert!(!quiet_row.over_threshold);

    // busiest first
    assert_eq!(rows[0].zone_id, busy.id);
}

#[tokio::test]
async fn test_dashboard_counts() {
    let state = state();
    let actor = manager();
    let zone = seed_zone(&state, 1000).await;
    let bed = seed_bed(&state, zone.id, 1000).await;

    let placed = seed_batch_in_bed(&state, &bed, 250).await;
    let ready = seed_batch(&state, Pathway::Purchasing, 40).await;
    let cancelled = seed_batch(&state, Pathway::OutSourcing, 10).await;
    state
        .batches()
        .set_status(&actor, ready.id, BatchStatus::Ready)
        .await
        .unwrap();
    state
        .batches()
        .set_status(&actor, cancelled.id, BatchStatus::Cancelled)
        .await
        .unwrap();

    let stats = state.reporting().dashboard_stats(&actor).await.unwrap();
    assert_eq!(stats.total_batches, 3);
    assert_eq!(stats.ready_batches, 1);
    assert_eq!(stats.in_progress_batches, 0);
    assert_eq!(stats.total_plants, i64::from(placed.current_qty) + 40);
    assert_eq!(stats.active_species, 3);
    assert_eq!(stats.zones_utilization, dec("25"));
}

#[tokio::test]
async fn test_dashboard_counts_pending_tasks_and_weekly_measurements() {
    let state = state();
    let actor = manager();
    let batch = seed_batch(&state, Pathway::SeedGermination, 50).await;

    let empty = state.reporting().dashboard_stats(&actor).await.unwrap();
    assert_eq!(empty.pending_tasks, 0);
    assert_eq!(empty.weekly_measurements, 0);

    for (girth, height) in [("4", "20"), ("5", "25")] {
        state
            .growth()
            .record_measurement(
                &actor,
                batch.id,
                RecordMeasurementInput {
                    girth_mm: dec(girth),
                    height_cm: dec(height),
                    sample_size: 5,
                    notes: None,
                },
            )
            .await
            .unwrap();
    }

    let mut task_ids = Vec::new();
    for title in ["Measure tray 4", "Inspect for aphids"] {
        let task = state
            .tasks()
            .create_task(
                &actor,
                CreateTaskInput {
                    user_id: actor.user_id,
                    task_type: TaskType::Inspection,
                    title: title.to_string(),
                    description: None,
                    due_date: Utc::now() + Duration::days(1),
                    batch_id: Some(batch.id),
                    zone_id: None,
                },
            )
            .await
            .unwrap();
        task_ids.push(task.id);
    }
    state
        .tasks()
        .complete_task(&actor, task_ids[0])
        .await
        .unwrap();

    let stats = state.reporting().dashboard_stats(&actor).await.unwrap();
    assert_eq!(stats.pending_tasks, 1);
    assert_eq!(stats.weekly_measurements, 2);
}

#[tokio::test]
async fn test_field_officer_cannot_view_analytics() {
    let state = state();
    let officer = field_officer();

    let err = state
        .reporting()
        .dashboard_stats(&officer)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientPermissions));

    let err = state
        .reporting()
        .zone_utilization(&officer)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientPermissions));
}

#[tokio::test]
async fn test_field_officer_can_read_reference_data() {
    let state = state();
    let officer = field_officer();
    seed_zone(&state, 10).await;
    seed_species(&state).await;

    assert_eq!(state.locations().list_zones(&officer).await.unwrap().len(), 1);
    assert_eq!(
        state.species().list_species(&officer, true).await.unwrap().len(),
        1
    );

    let err = state
        .locations()
        .create_zone(
            &officer,
            nursery_backend::services::location::CreateZoneInput {
                name: "Zone B".to_string(),
                capacity: 10,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientPermissions));
}
