//! Pathway stage graph and stage history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use super::{BatchStage, Pathway};

/// Append-only record of a stage transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageHistory {
    pub id: Uuid,
    pub batch_id: Uuid,
    /// Stage left by this transition, `INITIAL` for the first one.
    /// Optional only for imported rows.
    pub from_stage: Option<BatchStage>,
    pub to_stage: BatchStage,
    /// Plants moved by this transition
    pub quantity: i32,
    pub notes: Option<String>,
    pub recorded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Edges of the standard nursery workflow, per pathway.
///
/// Each pathway follows the step list shown when the batch is created:
/// purchased plants go through 60% shade, seedlings through 80% shade,
/// cuttings may skip the shade house and outsourced stock is potted on arrival.
pub const STANDARD_STAGE_EDGES: &[(Pathway, BatchStage, BatchStage)] = &[
    // Purchasing: initial data, propagation, 60% shade, growing, hardening
    (Pathway::Purchasing, BatchStage::Initial, BatchStage::Propagation),
    (Pathway::Purchasing, BatchStage::Propagation, BatchStage::Shade60),
    (Pathway::Purchasing, BatchStage::Shade60, BatchStage::Growing),
    (Pathway::Purchasing, BatchStage::Growing, BatchStage::Hardening),
    (Pathway::Purchasing, BatchStage::Hardening, BatchStage::RePotting),
    (Pathway::Purchasing, BatchStage::Hardening, BatchStage::Phytosanitary),
    (Pathway::Purchasing, BatchStage::RePotting, BatchStage::Phytosanitary),
    // Seed germination: seed data, propagation, 80% shade, growing
    (Pathway::SeedGermination, BatchStage::Initial, BatchStage::Propagation),
    (Pathway::SeedGermination, BatchStage::Propagation, BatchStage::Shade80),
    (Pathway::SeedGermination, BatchStage::Shade80, BatchStage::Growing),
    (Pathway::SeedGermination, BatchStage::Growing, BatchStage::RePotting),
    (Pathway::SeedGermination, BatchStage::Growing, BatchStage::Hardening),
    (Pathway::SeedGermination, BatchStage::RePotting, BatchStage::Hardening),
    (Pathway::SeedGermination, BatchStage::Hardening, BatchStage::Phytosanitary),
    // Cutting germination: direct propagation, growing integration
    (Pathway::CuttingGermination, BatchStage::Initial, BatchStage::Propagation),
    (Pathway::CuttingGermination, BatchStage::Propagation, BatchStage::Shade80),
    (Pathway::CuttingGermination, BatchStage::Propagation, BatchStage::Growing),
    (Pathway::CuttingGermination, BatchStage::Shade80, BatchStage::Growing),
    (Pathway::CuttingGermination, BatchStage::Growing, BatchStage::Hardening),
    (Pathway::CuttingGermination, BatchStage::Hardening, BatchStage::Phytosanitary),
    // Out sourcing: layering, 30cm plastic pot, integration
    (Pathway::OutSourcing, BatchStage::Initial, BatchStage::RePotting),
    (Pathway::OutSourcing, BatchStage::RePotting, BatchStage::Growing),
    (Pathway::OutSourcing, BatchStage::Growing, BatchStage::Hardening),
    (Pathway::OutSourcing, BatchStage::Hardening, BatchStage::Phytosanitary),
];

/// Legal transitions keyed by (pathway, from stage)
#[derive(Debug, Clone)]
pub struct StageGraph {
    edges: HashMap<(Pathway, BatchStage), BTreeSet<BatchStage>>,
}

impl StageGraph {
    /// The standard nursery workflow
    pub fn standard() -> Self {
        let mut edges: HashMap<(Pathway, BatchStage), BTreeSet<BatchStage>> = HashMap::new();
        for &(pathway, from, to) in STANDARD_STAGE_EDGES {
            edges.entry((pathway, from)).or_default().insert(to);
        }
        Self { edges }
    }

    pub fn is_allowed(&self, pathway: Pathway, from: BatchStage, to: BatchStage) -> bool {
        self.edges
            .get(&(pathway, from))
            .is_some_and(|targets| targets.contains(&to))
    }

    /// Stages reachable in one step from `from`
    pub fn next_stages(&self, pathway: Pathway, from: BatchStage) -> Vec<BatchStage> {
        self.edges
            .get(&(pathway, from))
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::standard()
    }
}
