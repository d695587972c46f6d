//! Batch models: pathway, status, stage and the batch aggregate itself

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::Location;
use crate::types::ParseEnumError;

/// How the plants of a batch were acquired. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Pathway {
    Purchasing,
    SeedGermination,
    CuttingGermination,
    OutSourcing,
}

impl Pathway {
    pub const ALL: [Pathway; 4] = [
        Pathway::Purchasing,
        Pathway::SeedGermination,
        Pathway::CuttingGermination,
        Pathway::OutSourcing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pathway::Purchasing => "PURCHASING",
            Pathway::SeedGermination => "SEED_GERMINATION",
            Pathway::CuttingGermination => "CUTTING_GERMINATION",
            Pathway::OutSourcing => "OUT_SOURCING",
        }
    }

    /// Three-letter prefix used in batch numbers
    pub fn code(&self) -> &'static str {
        match self {
            Pathway::Purchasing => "PUR",
            Pathway::SeedGermination => "SED",
            Pathway::CuttingGermination => "CUT",
            Pathway::OutSourcing => "OUT",
        }
    }
}

impl FromStr for Pathway {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PURCHASING" => Ok(Pathway::Purchasing),
            "SEED_GERMINATION" => Ok(Pathway::SeedGermination),
            "CUTTING_GERMINATION" => Ok(Pathway::CuttingGermination),
            "OUT_SOURCING" => Ok(Pathway::OutSourcing),
            _ => Err(ParseEnumError::new("pathway", s)),
        }
    }
}

impl std::fmt::Display for Pathway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pathway::Purchasing => write!(f, "Purchasing Plants"),
            Pathway::SeedGermination => write!(f, "Seed Germination"),
            Pathway::CuttingGermination => write!(f, "Cutting Germination"),
            Pathway::OutSourcing => write!(f, "Out Sourcing"),
        }
    }
}

/// Lifecycle status of a batch, decoupled from its stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Created,
    InProgress,
    Ready,
    Delivered,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Created => "CREATED",
            BatchStatus::InProgress => "IN_PROGRESS",
            BatchStatus::Ready => "READY",
            BatchStatus::Delivered => "DELIVERED",
            BatchStatus::Cancelled => "CANCELLED",
        }
    }

    /// Delivered and cancelled batches accept no further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Delivered | BatchStatus::Cancelled)
    }

    /// Whether the explicit status operation may move a batch from `self` to `next`.
    ///
    /// `InProgress` is never set explicitly; it is derived from the first stage
    /// transition out of `Initial`.
    pub fn can_mark(&self, next: BatchStatus) -> bool {
        match (self, next) {
            (BatchStatus::Created | BatchStatus::InProgress, BatchStatus::Ready) => true,
            (BatchStatus::Ready, BatchStatus::Delivered) => true,
            (current, BatchStatus::Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl FromStr for BatchStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(BatchStatus::Created),
            "IN_PROGRESS" => Ok(BatchStatus::InProgress),
            "READY" => Ok(BatchStatus::Ready),
            "DELIVERED" => Ok(BatchStatus::Delivered),
            "CANCELLED" => Ok(BatchStatus::Cancelled),
            _ => Err(ParseEnumError::new("batch status", s)),
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing step of a batch within its pathway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStage {
    Initial,
    Propagation,
    #[serde(rename = "SHADE_60")]
    Shade60,
    #[serde(rename = "SHADE_80")]
    Shade80,
    Growing,
    Hardening,
    RePotting,
    Phytosanitary,
}

impl BatchStage {
    pub const ALL: [BatchStage; 8] = [
        BatchStage::Initial,
        BatchStage::Propagation,
        BatchStage::Shade60,
        BatchStage::Shade80,
        BatchStage::Growing,
        BatchStage::Hardening,
        BatchStage::RePotting,
        BatchStage::Phytosanitary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStage::Initial => "INITIAL",
            BatchStage::Propagation => "PROPAGATION",
            BatchStage::Shade60 => "SHADE_60",
            BatchStage::Shade80 => "SHADE_80",
            BatchStage::Growing => "GROWING",
            BatchStage::Hardening => "HARDENING",
            BatchStage::RePotting => "RE_POTTING",
            BatchStage::Phytosanitary => "PHYTOSANITARY",
        }
    }
}

impl FromStr for BatchStage {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIAL" => Ok(BatchStage::Initial),
            "PROPAGATION" => Ok(BatchStage::Propagation),
            "SHADE_60" => Ok(BatchStage::Shade60),
            "SHADE_80" => Ok(BatchStage::Shade80),
            "GROWING" => Ok(BatchStage::Growing),
            "HARDENING" => Ok(BatchStage::Hardening),
            "RE_POTTING" => Ok(BatchStage::RePotting),
            "PHYTOSANITARY" => Ok(BatchStage::Phytosanitary),
            _ => Err(ParseEnumError::new("batch stage", s)),
        }
    }
}

impl std::fmt::Display for BatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStage::Initial => write!(f, "Initial"),
            BatchStage::Propagation => write!(f, "Propagation"),
            BatchStage::Shade60 => write!(f, "60% Shade Area"),
            BatchStage::Shade80 => write!(f, "80% Shade Area"),
            BatchStage::Growing => write!(f, "Growing Zone"),
            BatchStage::Hardening => write!(f, "Hardening"),
            BatchStage::RePotting => write!(f, "Re-potting"),
            BatchStage::Phytosanitary => write!(f, "Phytosanitary"),
        }
    }
}

/// A cohort of plants of one species tracked as a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    /// System generated, e.g. "SED-241018-0003"
    pub batch_number: String,
    pub custom_name: Option<String>,
    pub pathway: Pathway,
    pub species_id: Uuid,
    pub initial_qty: i32,
    pub current_qty: i32,
    pub status: BatchStatus,
    pub stage: BatchStage,
    pub is_ready: bool,
    pub ready_date: Option<DateTime<Utc>>,
    pub loss_qty: i32,
    pub loss_reason: Option<String>,
    pub created_by: Uuid,
    pub zone_id: Option<Uuid>,
    pub bed_id: Option<Uuid>,
    /// When the batch entered its current stage
    pub stage_entered_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every committed mutation
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    /// Where this batch currently holds capacity, if anywhere
    pub fn placement(&self) -> Option<Location> {
        match (self.bed_id, self.zone_id) {
            (Some(bed_id), _) => Some(Location::Bed(bed_id)),
            (None, Some(zone_id)) => Some(Location::Zone(zone_id)),
            (None, None) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// currentQty = initialQty - lossQty, 0 <= currentQty <= initialQty
    pub fn quantities_consistent(&self) -> bool {
        self.current_qty == self.initial_qty - self.loss_qty
            && self.current_qty >= 0
            && self.current_qty <= self.initial_qty
            && self.loss_qty >= 0
    }

    /// Plants that can still be lost before the batch is empty
    pub fn remaining_loss_allowance(&self) -> i32 {
        self.initial_qty - self.loss_qty
    }
}

/// Build a batch number: `{pathway code}-{YYMMDD}-{sequence:04}`
pub fn generate_batch_number(pathway: Pathway, date: NaiveDate, sequence: u32) -> String {
    format!("{}-{}-{:04}", pathway.code(), date.format("%y%m%d"), sequence)
}
