use crate::embedding::EmbeddingStage;
use crate::ensemble::EnsembleStage;
use serde::Serialize;
use strum::{Display, EnumIter, EnumString};

/// Processing path of a protein.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Lane {
    /// Embedding plus distances to known domains.
    DomainFeatured,
    /// Embedding only.
    Fallback,
}

impl Lane {
    pub fn uses_domain_features(&self) -> bool {
        matches!(self, Lane::DomainFeatured)
    }
}

/// The embedding model and ensemble serving one lane.
pub struct LaneModels {
    pub embedding: EmbeddingStage,
    pub ensemble: EnsembleStage,
}

impl LaneModels {
    pub fn new(embedding: EmbeddingStage, ensemble: EnsembleStage) -> Self {
        Self {
            embedding,
            ensemble,
        }
    }

    pub fn lane(&self) -> Lane {
        self.ensemble.lane()
    }
}

/// Counters for one lane of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneReport {
    pub lane: Lane,
    /// Proteins routed to the lane.
    pub submitted: usize,
    /// Proteins that received a prediction.
    pub classified: usize,
    /// Proteins dropped before embedding (no sequence, unreadable file).
    pub skipped: usize,
    pub embedding_batches: usize,
    pub classification_batches: usize,
    pub positives: usize,
}

impl LaneReport {
    pub fn new(lane: Lane) -> Self {
        Self {
            lane,
            submitted: 0,
            classified: 0,
            skipped: 0,
            embedding_batches: 0,
            classification_batches: 0,
            positives: 0,
        }
    }
}
