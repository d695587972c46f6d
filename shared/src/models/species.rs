//! Plant species catalogue

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::types::ParseEnumError;

/// A species grown in the nursery, with its dispatch targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub id: Uuid,
    pub name: String,
    pub scientific_name: Option<String>,
    pub description: Option<String>,
    pub category: SpeciesCategory,
    /// Target stem girth in millimetres
    pub target_girth_mm: Decimal,
    /// Target height in centimetres
    pub target_height_cm: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Growth form of a species
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeciesCategory {
    Tree,
    Shrub,
    Herb,
    Grass,
    Fern,
    Vine,
    Succulent,
    Aquatic,
}

impl SpeciesCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeciesCategory::Tree => "TREE",
            SpeciesCategory::Shrub => "SHRUB",
            SpeciesCategory::Herb => "HERB",
            SpeciesCategory::Grass => "GRASS",
            SpeciesCategory::Fern => "FERN",
            SpeciesCategory::Vine => "VINE",
            SpeciesCategory::Succulent => "SUCCULENT",
            SpeciesCategory::Aquatic => "AQUATIC",
        }
    }
}

impl FromStr for SpeciesCategory {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TREE" => Ok(SpeciesCategory::Tree),
            "SHRUB" => Ok(SpeciesCategory::Shrub),
            "HERB" => Ok(SpeciesCategory::Herb),
            "GRASS" => Ok(SpeciesCategory::Grass),
            "FERN" => Ok(SpeciesCategory::Fern),
            "VINE" => Ok(SpeciesCategory::Vine),
            "SUCCULENT" => Ok(SpeciesCategory::Succulent),
            "AQUATIC" => Ok(SpeciesCategory::Aquatic),
            _ => Err(ParseEnumError::new("species category", s)),
        }
    }
}

impl std::fmt::Display for SpeciesCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeciesCategory::Tree => write!(f, "Tree"),
            SpeciesCategory::Shrub => write!(f, "Shrub"),
            SpeciesCategory::Herb => write!(f, "Herb"),
            SpeciesCategory::Grass => write!(f, "Grass"),
            SpeciesCategory::Fern => write!(f, "Fern"),
            SpeciesCategory::Vine => write!(f, "Vine"),
            SpeciesCategory::Succulent => write!(f, "Succulent"),
            SpeciesCategory::Aquatic => write!(f, "Aquatic"),
        }
    }
}
