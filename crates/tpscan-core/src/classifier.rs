//! Classifier specifications and the classifier interface used by the ensemble.

use crate::domain::DomainLabel;
use crate::error::{ClassifierError, ScreenError};
use itertools::Itertools;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use validator::{Validate, ValidationError};

pub const CLASSIFIER_SCHEMA_VERSION: u32 = 1;

/// Sentinel class emitted by some classifiers; never averaged or reported.
pub const UNKNOWN_CLASS: &str = "Unknown";
/// Class whose averaged probability decides a positive detection.
pub const TARGET_CLASS: &str = "isTPS";
/// Class screened additionally when precursor synthases are requested.
pub const PRECURSOR_CLASS: &str = "precursor substr";

/// A known reference module and the feature slot its comparison score lands in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutSlot {
    pub known_module_id: String,
    pub index: usize,
}

/// ClassifierSpec
///
/// Everything the pipeline needs to know about one ensemble member to build its input:
/// * `domain_layout` maps a domain label (`alpha1`, `beta`, ...) to the known modules
///   compared against it and the feature index each score is written to.
/// * `embedding_indices` optionally restricts the embedding to a subset of its columns.
/// * `classes` is the ordered list of output classes.
///
/// The classifier input is `[embedding (projected)] ++ [domain features]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ClassifierSpec {
    pub schema_version: u32,
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    #[validate(custom(function = "validate_layout"))]
    pub domain_layout: BTreeMap<String, Vec<LayoutSlot>>,
    #[serde(default)]
    pub embedding_indices: Option<Vec<usize>>,
    #[validate(length(min = 1))]
    pub classes: Vec<String>,
}

fn validate_layout(layout: &BTreeMap<String, Vec<LayoutSlot>>) -> Result<(), ValidationError> {
    for key in layout.keys() {
        if let Err(message) = key.parse::<DomainLabel>() {
            return Err(ValidationError::new("domain_label").with_message(message.into()));
        }
    }
    let indices: Vec<usize> = layout
        .values()
        .flatten()
        .map(|slot| slot.index)
        .sorted()
        .collect();
    if indices.iter().enumerate().any(|(i, &index)| i != index) {
        return Err(ValidationError::new("layout_indices").with_message(
            format!(
                "layout indices must cover 0..{} exactly once, got {:?}",
                indices.len(),
                indices
            )
            .into(),
        ));
    }
    Ok(())
}

impl ClassifierSpec {
    pub fn from_json_str(json: &str) -> Result<Self, ScreenError> {
        let spec: ClassifierSpec = serde_json::from_str(json)?;
        spec.validated()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ScreenError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check schema version, field constraints and the embedding subset.
    pub fn validated(self) -> Result<Self, ScreenError> {
        if self.schema_version != CLASSIFIER_SCHEMA_VERSION {
            return Err(ScreenError::SchemaVersion {
                what: format!("classifier spec `{}`", self.name),
                found: self.schema_version,
                expected: CLASSIFIER_SCHEMA_VERSION,
            });
        }
        self.validate().map_err(|e| ScreenError::InvalidSpec {
            name: self.name.clone(),
            message: e.to_string(),
        })?;
        if let Some(indices) = &self.embedding_indices {
            if indices.is_empty() || !indices.iter().all_unique() {
                return Err(ScreenError::InvalidSpec {
                    name: self.name.clone(),
                    message: "embedding_indices must be non-empty and unique".to_string(),
                });
            }
        }
        Ok(self)
    }

    /// Number of domain-feature slots, independent of how many domains get detected.
    pub fn domain_feature_count(&self) -> usize {
        self.domain_layout.values().map(Vec::len).sum()
    }

    /// Slots registered for a domain label; empty when the layout does not use the label.
    pub fn slots_for(&self, label: &DomainLabel) -> &[LayoutSlot] {
        self.domain_layout
            .get(&label.to_string())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// An ensemble member.
pub trait ProbabilisticClassifier {
    fn spec(&self) -> &ClassifierSpec;

    /// Positive-outcome probability for every (sample, class) pair.
    ///
    /// `features` has one row per sample; the returned array has one row per sample and
    /// one column per entry of `spec().classes`.
    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>, ClassifierError>;
}
