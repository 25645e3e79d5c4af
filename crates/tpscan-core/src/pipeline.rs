//! Lane routing and the sequential run over both lanes.

use crate::accumulator::{BatchAccumulator, ClassificationWindow, PendingProtein};
use crate::collaborators::SequenceReader;
use crate::config::ScreenConfig;
use crate::domain::{DomainComparison, DomainDetections};
use crate::error::{ProteinIssue, ScreenError};
use crate::features::{assemble_all, DomainFeatures};
use crate::lane::{Lane, LaneModels, LaneReport};
use crate::sink::{Decision, ResultSink};
use crate::structure::Structure;
use serde::Serialize;
use tracing::{info, warn};

/// Proteins split by lane. Each structure appears in exactly one of the two lists.
#[derive(Debug, Default)]
pub struct LanePartition {
    /// One feature vector per domain-lane classifier for every protein.
    pub domain_featured: Vec<(Structure, DomainFeatures)>,
    pub fallback: Vec<Structure>,
    /// Proteins that had domain detections but were moved to the fallback lane.
    pub rerouted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub lanes: Vec<LaneReport>,
    pub rerouted: usize,
}

impl RunSummary {
    pub fn positives(&self) -> usize {
        self.lanes.iter().map(|l| l.positives).sum()
    }

    pub fn lane(&self, lane: Lane) -> Option<&LaneReport> {
        self.lanes.iter().find(|l| l.lane == lane)
    }
}

/// ScreeningPipeline
///
/// Routes every structure into a lane, then runs the domain-featured lane to completion
/// before the fallback lane. Each lane has its own embedder, ensemble and accumulator.
pub struct ScreeningPipeline<'a> {
    config: ScreenConfig,
    reader: &'a dyn SequenceReader,
    domain_lane: LaneModels,
    fallback_lane: LaneModels,
}

impl<'a> ScreeningPipeline<'a> {
    pub fn new(
        config: ScreenConfig,
        reader: &'a dyn SequenceReader,
        domain_lane: LaneModels,
        fallback_lane: LaneModels,
    ) -> Result<Self, ScreenError> {
        let config = config.validated()?;
        for (models, expected) in [
            (&domain_lane, Lane::DomainFeatured),
            (&fallback_lane, Lane::Fallback),
        ] {
            if models.lane() != expected {
                return Err(ScreenError::Config(format!(
                    "{} ensemble supplied for the {expected} lane",
                    models.lane()
                )));
            }
        }
        Ok(Self {
            config,
            reader,
            domain_lane,
            fallback_lane,
        })
    }

    pub fn config(&self) -> &ScreenConfig {
        &self.config
    }

    /// Decide the lane of every structure.
    ///
    /// A structure enters the domain-featured lane only when it has detected domains, a
    /// comparison entry, and every classifier of the domain ensemble finds meaningful
    /// evidence. Rerouted structures are appended after the structures that never had
    /// detections.
    pub fn partition(
        &self,
        structures: &[Structure],
        detections: &DomainDetections,
        comparison: &DomainComparison,
    ) -> LanePartition {
        let mut partition = LanePartition::default();
        let mut rerouted = Vec::new();
        for structure in structures {
            let id = structure.id.as_str();
            let (Some(detected), Some(scores)) = (detections.get(id), comparison.get(id)) else {
                partition.fallback.push(structure.clone());
                continue;
            };
            if detected.is_empty() {
                partition.fallback.push(structure.clone());
                continue;
            }
            match assemble_all(id, detected, scores, self.domain_lane.ensemble.specs()) {
                Ok(features) => partition.domain_featured.push((structure.clone(), features)),
                Err(issue) => {
                    warn!(structure_id = id, %issue, "moving protein to the fallback lane");
                    partition.rerouted.push(structure.id.clone());
                    rerouted.push(structure.clone());
                }
            }
        }
        partition.fallback.extend(rerouted);
        info!(
            domain_featured = partition.domain_featured.len(),
            fallback = partition.fallback.len(),
            rerouted = partition.rerouted.len(),
            "proteins partitioned into lanes"
        );
        partition
    }

    pub fn run(
        &mut self,
        structures: &[Structure],
        detections: &DomainDetections,
        comparison: &DomainComparison,
        sink: &mut ResultSink,
    ) -> Result<RunSummary, ScreenError> {
        let partition = self.partition(structures, detections, comparison);
        let rerouted = partition.rerouted.len();

        let domain_proteins = partition
            .domain_featured
            .into_iter()
            .map(|(structure, features)| (structure, Some(features)));
        let domain_report = screen_lane(
            &mut self.domain_lane,
            self.reader,
            &self.config,
            domain_proteins,
            sink,
        )?;

        let fallback_proteins = partition.fallback.into_iter().map(|s| (s, None));
        let fallback_report = screen_lane(
            &mut self.fallback_lane,
            self.reader,
            &self.config,
            fallback_proteins,
            sink,
        )?;

        Ok(RunSummary {
            lanes: vec![domain_report, fallback_report],
            rerouted,
        })
    }
}

/// Run one lane to completion: read, embed and classify every protein, then record.
fn screen_lane(
    models: &mut LaneModels,
    reader: &dyn SequenceReader,
    config: &ScreenConfig,
    proteins: impl ExactSizeIterator<Item = (Structure, Option<DomainFeatures>)>,
    sink: &mut ResultSink,
) -> Result<LaneReport, ScreenError> {
    let lane = models.lane();
    let mut report = LaneReport::new(lane);
    report.submitted = proteins.len();
    if report.submitted == 0 {
        info!(%lane, "no proteins in lane");
        return Ok(report);
    }
    info!(%lane, proteins = report.submitted, "screening lane");

    let embedding_calls = models.embedding.calls();
    let mut accumulator = BatchAccumulator::new(config.plm_batch_size, config.clf_batch_size);
    for (structure, features) in proteins {
        let features = if lane.uses_domain_features() {
            features
        } else {
            None
        };
        let sequence = match reader
            .chain_sequences(&structure)
            .map_err(|e| ProteinIssue::Unreadable(format!("{e:#}")))
            .and_then(|chains| models.embedding.prepare(&structure.id, chains))
        {
            Ok(sequence) => sequence,
            Err(issue) => {
                warn!(structure_id = %structure.id, %lane, %issue, "skipping protein");
                report.skipped += 1;
                continue;
            }
        };
        let protein = PendingProtein {
            id: structure.id,
            sequence,
            features,
        };
        if let Some(window) = accumulator.add(protein, &mut models.embedding)? {
            classify_window(models, &window, sink, &mut report)?;
        }
    }
    if let Some(window) = accumulator.finish(&mut models.embedding)? {
        classify_window(models, &window, sink, &mut report)?;
    }
    report.embedding_batches = models.embedding.calls() - embedding_calls;
    info!(
        %lane,
        classified = report.classified,
        skipped = report.skipped,
        positives = report.positives,
        "lane finished"
    );
    Ok(report)
}

fn classify_window(
    models: &mut LaneModels,
    window: &ClassificationWindow,
    sink: &mut ResultSink,
    report: &mut LaneReport,
) -> Result<(), ScreenError> {
    let predictions = models.ensemble.classify(window)?;
    report.classification_batches += 1;
    for (id, prediction) in window.ids.iter().zip(&predictions) {
        if let Decision::Positive(_) = sink.record(id, prediction)? {
            report.positives += 1;
        }
        report.classified += 1;
    }
    Ok(())
}
