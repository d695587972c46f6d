//! Species reference data

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{validation, Action, Actor, Resource, Species, SpeciesCategory};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::{authorize, check};
use crate::store::NurseryStore;

/// Species service for managing growth targets
#[derive(Clone)]
pub struct SpeciesService {
    store: Arc<dyn NurseryStore>,
}

/// Input for creating a species
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSpeciesInput {
    pub name: String,
    #[validate(length(max = 200, message = "Scientific name must be at most 200 characters"))]
    pub scientific_name: Option<String>,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
    pub category: SpeciesCategory,
    pub target_girth_mm: Decimal,
    pub target_height_cm: Decimal,
}

/// Input for updating a species
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateSpeciesInput {
    pub name: Option<String>,
    #[validate(length(max = 200, message = "Scientific name must be at most 200 characters"))]
    pub scientific_name: Option<String>,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
    pub category: Option<SpeciesCategory>,
    pub target_girth_mm: Option<Decimal>,
    pub target_height_cm: Option<Decimal>,
    pub is_active: Option<bool>,
}

impl SpeciesService {
    /// Create a new SpeciesService instance
    pub fn new(store: Arc<dyn NurseryStore>) -> Self {
        Self { store }
    }

    pub async fn create_species(
        &self,
        actor: &Actor,
        input: CreateSpeciesInput,
    ) -> AppResult<Species> {
        authorize(actor, Resource::Species, Action::Create)?;
        input.validate()?;
        check("name", validation::validate_species_name(&input.name))?;
        check(
            "target_girth_mm",
            validation::validate_species_targets(input.target_girth_mm, input.target_height_cm),
        )?;

        let now = Utc::now();
        let species = Species {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            scientific_name: input.scientific_name,
            description: input.description,
            category: input.category,
            target_girth_mm: input.target_girth_mm,
            target_height_cm: input.target_height_cm,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_species(&species).await?;

        tracing::info!(species_id = %species.id, name = %species.name, "species created");
        Ok(species)
    }

    /// Edit a species. Deactivating keeps existing batches but blocks new ones.
    pub async fn update_species(
        &self,
        actor: &Actor,
        species_id: Uuid,
        input: UpdateSpeciesInput,
    ) -> AppResult<Species> {
        authorize(actor, Resource::Species, Action::Edit)?;
        input.validate()?;

        let mut species = self
            .store
            .get_species(species_id)
            .await?
            .ok_or_else(|| AppError::not_found("species", species_id))?;

        if let Some(name) = &input.name {
            check("name", validation::validate_species_name(name))?;
            species.name = name.trim().to_string();
        }
        if input.scientific_name.is_some() {
            species.scientific_name = input.scientific_name;
        }
        if input.description.is_some() {
            species.description = input.description;
        }
        if let Some(category) = input.category {
            species.category = category;
        }
        if let Some(girth) = input.target_girth_mm {
            species.target_girth_mm = girth;
        }
        if let Some(height) = input.target_height_cm {
            species.target_height_cm = height;
        }
        if let Some(active) = input.is_active {
            species.is_active = active;
        }
        check(
            "target_girth_mm",
            validation::validate_species_targets(species.target_girth_mm, species.target_height_cm),
        )?;

        species.updated_at = Utc::now();
        self.store.update_species(&species).await?;
        Ok(species)
    }

    /// Remove a species that no batch references
    pub async fn delete_species(&self, actor: &Actor, species_id: Uuid) -> AppResult<()> {
        authorize(actor, Resource::Species, Action::Delete)?;
        self.store.delete_species(species_id).await?;
        tracing::info!(%species_id, "species deleted");
        Ok(())
    }

    pub async fn get_species(&self, actor: &Actor, species_id: Uuid) -> AppResult<Species> {
        authorize(actor, Resource::Species, Action::View)?;
        self.store
            .get_species(species_id)
            .await?
            .ok_or_else(|| AppError::not_found("species", species_id))
    }

    pub async fn list_species(&self, actor: &Actor, active_only: bool) -> AppResult<Vec<Species>> {
        authorize(actor, Resource::Species, Action::View)?;
        self.store.list_species(active_only).await
    }
}
