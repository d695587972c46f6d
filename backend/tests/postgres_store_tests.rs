//! PostgreSQL store tests
//!
//! Skipped unless `NURSERY_TEST_DATABASE_URL` points at a scratch database.

mod common;

use chrono::{Duration, Utc};
use common::*;
use nursery_backend::config::DatabaseConfig;
use nursery_backend::services::task::CreateTaskInput;
use nursery_backend::store::PgStore;
use nursery_backend::{AppError, AppState, Config};
use shared::{Location, TaskType};
use std::sync::Arc;

async fn pg_state() -> Option<AppState> {
    let url = std::env::var("NURSERY_TEST_DATABASE_URL").ok()?;
    let config = Config::default();
    let store = PgStore::connect(&DatabaseConfig {
        url,
        max_connections: 5,
        min_connections: 1,
    })
    .await
    .unwrap();
    store.migrate().await.unwrap();
    Some(AppState::new(Arc::new(store), config))
}

#[tokio::test]
async fn test_pg_huge_reservation_is_rejected() {
    let Some(state) = pg_state().await else {
        return;
    };
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

#[tokio::test]
async fn test_pg_task_completes_once() {
    let Some(state) = pg_state().await else {
        return;
    };
    let actor = manager();
    let task = state
        .tasks()
        .create_task(
            &actor,
            CreateTaskInput {
                user_id: actor.user_id,
                task_type: TaskType::Maintenance,
                title: "Repair shade net".to_string(),
                description: None,
                due_date: Utc::now() + Duration::days(2),
                batch_id: None,
                zone_id: None,
            },
        )
        .await
        .unwrap();

    let done = state.tasks().complete_task(&actor, task.id).await.unwrap();
    assert!(done.is_completed);
    assert!(done.completed_at.is_some());

    let again = state.tasks().complete_task(&actor, task.id).await;
    assert!(matches!(again, Err(AppError::Conflict { .. })));
}
