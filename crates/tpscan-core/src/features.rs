//! Domain-feature assembly.
//!
//! For every ensemble member of the domain-featured lane a protein gets a fixed-length vector
//! whose slots hold `1 - similarity` between one of its detected domains and a known reference
//! domain. Slots of domain labels that were not detected stay at `0`.

use crate::classifier::ClassifierSpec;
use crate::domain::{label_domains, DetectedDomain, KnownScores};
use crate::error::ProteinIssue;
use std::collections::HashMap;
use tracing::debug;

/// Below this best similarity the domain evidence is treated as uninformative.
///
/// The bound is exclusive: a best similarity of exactly `0.4` keeps the protein in the
/// domain-featured lane.
pub const EVIDENCE_THRESHOLD: f32 = 0.4;

/// Distances to known domains, laid out as the owning classifier expects.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// One feature vector per ensemble member, in ensemble order.
pub type DomainFeatures = Vec<FeatureVector>;

/// Build the feature vector of one protein for one classifier.
///
/// `comparisons` maps the protein's detected module ids to their known-module scores.
/// Returns [`ProteinIssue::WeakDomainEvidence`] when the best similarity left in any slot
/// after all domains are written is below [`EVIDENCE_THRESHOLD`].
pub fn assemble(
    structure_id: &str,
    detected: &[DetectedDomain],
    comparisons: &HashMap<String, KnownScores>,
    spec: &ClassifierSpec,
) -> Result<FeatureVector, ProteinIssue> {
    let mut features = vec![0f32; spec.domain_feature_count()];
    // similarity behind each slot; a later domain with the same label overwrites it
    let mut similarities = vec![0f32; features.len()];
    for (label, domain) in label_domains(structure_id, detected) {
        let slots = spec.slots_for(&label);
        if slots.is_empty() {
            debug!(structure_id, %label, classifier = %spec.name, "domain label not used by classifier");
            continue;
        }
        let scores = comparisons.get(&domain.module_id);
        for slot in slots {
            let similarity = scores
                .and_then(|s| s.get(&slot.known_module_id))
                .copied()
                .unwrap_or(0.0);
            similarities[slot.index] = similarity;
            features[slot.index] = 1.0 - similarity;
        }
    }
    let best = similarities.iter().copied().fold(0f32, f32::max);
    if best < EVIDENCE_THRESHOLD {
        return Err(ProteinIssue::WeakDomainEvidence { best });
    }
    Ok(FeatureVector(features))
}

/// Build the feature vectors of one protein for every classifier of an ensemble.
///
/// A single classifier without meaningful evidence evicts the protein from the
/// domain-featured lane for the whole run.
pub fn assemble_all<'a>(
    structure_id: &str,
    detected: &[DetectedDomain],
    comparisons: &HashMap<String, KnownScores>,
    specs: impl IntoIterator<Item = &'a ClassifierSpec>,
) -> Result<DomainFeatures, ProteinIssue> {
    specs
        .into_iter()
        .map(|spec| assemble(structure_id, detected, comparisons, spec))
        .collect()
}
