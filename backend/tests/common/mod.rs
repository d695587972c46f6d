//! Fixtures shared by the integration tests

#![allow(dead_code)]

use nursery_backend::services::batch::CreateBatchInput;
use nursery_backend::services::location::{CreateBedInput, CreateZoneInput};
use nursery_backend::services::species::CreateSpeciesInput;
use nursery_backend::{AppState, Config};
use rust_decimal::Decimal;
use shared::{Actor, Batch, Bed, Pathway, Species, SpeciesCategory, UserRole, Zone};
use std::str::FromStr;
use uuid::Uuid;

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn manager() -> Actor {
    Actor::new(Uuid::new_v4(), UserRole::Manager)
}

pub fn field_officer() -> Actor {
    Actor::new(Uuid::new_v4(), UserRole::FieldOfficer)
}

pub fn state() -> AppState {
    state_with(Config::default())
}

/// Service events show up when `RUST_LOG` is set
pub fn state_with(config: Config) -> AppState {
    if std::env::var_os("RUST_LOG").is_some() {
        nursery_backend::telemetry::init_tracing();
    }
    AppState::in_memory(config)
}

/// Single-threaded runtime for driving services inside proptest bodies
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Teak: 10 mm girth, 50 cm height
pub async fn seed_species(state: &AppState) -> Species {
    state
        .species()
        .create_species(
            &manager(),
            CreateSpeciesInput {
                name: format!("Teak {}", Uuid::new_v4()),
                scientific_name: Some("Tectona grandis".to_string()),
                description: None,
                category: SpeciesCategory::Tree,
                target_girth_mm: dec("10"),
                target_height_cm: dec("50"),
            },
        )
        .await
        .unwrap()
}

pub async fn seed_zone(state: &AppState, capacity: i32) -> Zone {
    state
        .locations()
        .create_zone(
            &manager(),
            CreateZoneInput {
                name: "Zone A".to_string(),
                capacity,
            },
        )
        .await
        .unwrap()
}

pub async fn seed_bed(state: &AppState, zone_id: Uuid, capacity: i32) -> Bed {
    state
        .locations()
        .create_bed(
            &manager(),
            CreateBedInput {
                zone_id,
                name: "Bed 1".to_string(),
                capacity,
            },
        )
        .await
        .unwrap()
}

pub fn batch_input(species_id: Uuid, pathway: Pathway, initial_qty: i32) -> CreateBatchInput {
    CreateBatchInput {
        species_id,
        pathway,
        initial_qty,
        custom_name: None,
        zone_id: None,
        bed_id: None,
    }
}

pub async fn seed_batch(state: &AppState, pathway: Pathway, initial_qty: i32) -> Batch {
    let species = seed_species(state).await;
    state
        .batches()
        .create_batch(&manager(), batch_input(species.id, pathway, initial_qty))
        .await
        .unwrap()
}

pub async fn seed_batch_in_bed(state: &AppState, bed: &Bed, initial_qty: i32) -> Batch {
    let species = seed_species(state).await;
    let mut input = batch_input(species.id, Pathway::SeedGermination, initial_qty);
    input.bed_id = Some(bed.id);
    state
        .batches()
        .create_batch(&manager(), input)
        .await
        .unwrap()
}
