//! Ensemble classification of a window of embedded proteins.

use crate::accumulator::ClassificationWindow;
use crate::classifier::{ClassifierSpec, ProbabilisticClassifier, UNKNOWN_CLASS};
use crate::error::{ClassifierError, ScreenError};
use crate::features::DomainFeatures;
use crate::lane::Lane;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Class name -> probability averaged over the ensemble members that scored the protein.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prediction(BTreeMap<String, f32>);

impl Prediction {
    pub fn get(&self, class: &str) -> Option<f32> {
        self.0.get(class).copied()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&String, &f32)> {
        self.0.iter()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f32)> for Prediction {
    fn from_iter<I: IntoIterator<Item = (String, f32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Running per-class sums for one protein.
#[derive(Default)]
struct ClassVotes(BTreeMap<String, (f32, u32)>);

impl ClassVotes {
    fn record(&mut self, class: &str, probability: f32) {
        let entry = self.0.entry(class.to_string()).or_insert((0.0, 0));
        entry.0 += probability;
        entry.1 += 1;
    }
    fn average(self) -> Prediction {
        self.0
            .into_iter()
            .map(|(class, (sum, n))| (class, sum / n as f32))
            .collect()
    }
}

/// Input matrix of one ensemble member: the (projected) embedding followed by the member's
/// domain features when the lane carries them.
fn member_input(
    member: usize,
    spec: &ClassifierSpec,
    embeddings: ArrayView2<'_, f32>,
    features: &[Option<DomainFeatures>],
) -> Result<Array2<f32>, ClassifierError> {
    let width = embeddings.ncols();
    let projected = match &spec.embedding_indices {
        Some(indices) => {
            if let Some(&index) = indices.iter().find(|&&index| index >= width) {
                return Err(ClassifierError::ProjectionIndex { index, width });
            }
            embeddings.select(Axis(1), indices)
        }
        None => embeddings.to_owned(),
    };
    let domain_width = spec.domain_feature_count();
    let rows = projected.nrows();
    let mut input = Vec::with_capacity(rows * (projected.ncols() + domain_width));
    for (row, protein_features) in projected.outer_iter().zip(features) {
        input.extend(row.iter().copied());
        if let Some(per_member) = protein_features {
            let fv = per_member.get(member).ok_or(ClassifierError::FeatureWidth {
                expected: domain_width,
                found: 0,
            })?;
            if fv.len() != domain_width {
                return Err(ClassifierError::FeatureWidth {
                    expected: domain_width,
                    found: fv.len(),
                });
            }
            input.extend_from_slice(fv.as_slice());
        }
    }
    let featured = features.iter().any(Option::is_some);
    let columns = projected.ncols() + if featured { domain_width } else { 0 };
    Array2::from_shape_vec((rows, columns), input)
        .map_err(|e| ClassifierError::Inference(e.to_string()))
}

/// EnsembleStage
///
/// Applies every member in a fixed order and averages the per-class probabilities of each
/// protein over the members that produced one. A member that fails on a batch is logged and
/// left out of that batch's average; if every member fails the batch is a systemic failure.
pub struct EnsembleStage {
    lane: Lane,
    members: Vec<Box<dyn ProbabilisticClassifier>>,
    batches: usize,
}

impl EnsembleStage {
    pub fn new(
        lane: Lane,
        members: Vec<Box<dyn ProbabilisticClassifier>>,
    ) -> Result<Self, ScreenError> {
        if members.is_empty() {
            return Err(ScreenError::Config(format!(
                "the {lane} ensemble has no classifiers"
            )));
        }
        Ok(Self {
            lane,
            members,
            batches: 0,
        })
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn specs(&self) -> impl Iterator<Item = &ClassifierSpec> {
        self.members.iter().map(|m| m.spec())
    }

    /// One prediction per id of the window, in window order.
    pub fn classify(
        &mut self,
        window: &ClassificationWindow,
    ) -> Result<Vec<Prediction>, ScreenError> {
        self.batches += 1;
        let batch = self.batches;
        info!(lane = %self.lane, batch, proteins = window.len(), "predicting for batch");
        let embeddings = window.stacked()?;
        let n_samples = embeddings.nrows();
        let mut votes: Vec<ClassVotes> = (0..n_samples).map(|_| ClassVotes::default()).collect();
        let mut contributed = 0;

        for (member_i, member) in self.members.iter().enumerate() {
            let spec = member.spec();
            info!(
                lane = %self.lane,
                classifier = %spec.name,
                "predicting with classifier {}/{}",
                member_i + 1,
                self.members.len()
            );
            let scored = member_input(member_i, spec, embeddings.view(), &window.features)
                .and_then(|input| member.predict_proba(input.view()))
                .and_then(|proba| {
                    if proba.dim() != (n_samples, spec.classes.len()) {
                        return Err(ClassifierError::OutputShape {
                            rows: n_samples,
                            classes: spec.classes.len(),
                            found_rows: proba.nrows(),
                            found_classes: proba.ncols(),
                        });
                    }
                    Ok(proba)
                });
            let proba = match scored {
                Ok(proba) => proba,
                Err(e) => {
                    warn!(
                        lane = %self.lane,
                        classifier = %spec.name,
                        batch,
                        error = %e,
                        "classifier failed, excluding it from this batch"
                    );
                    continue;
                }
            };
            contributed += 1;
            for (sample_votes, row) in votes.iter_mut().zip(proba.outer_iter()) {
                for (class, &p) in spec.classes.iter().zip(row.iter()) {
                    if class != UNKNOWN_CLASS {
                        sample_votes.record(class, p);
                    }
                }
            }
        }

        if contributed == 0 {
            return Err(ScreenError::EnsembleExhausted {
                lane: self.lane,
                batch,
            });
        }
        info!(lane = %self.lane, batch, classifiers = contributed, "averaging predictions over all models");
        Ok(votes.into_iter().map(ClassVotes::average).collect())
    }
}
