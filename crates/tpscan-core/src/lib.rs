//! # tpscan-core
//!
//! Batched inference core for screening protein structures for terpene-synthase activity.
//!
//! __tpscan-core__ provides:
//! * the data model shared by the workspace ([`Structure`], [`DetectedDomain`], [`ClassifierSpec`], ...)
//! * domain-feature assembly against a classifier layout ([`features`])
//! * batching of sequences into embedding and classification windows ([`BatchAccumulator`])
//! * ensemble classification with per-protein averaging ([`EnsembleStage`])
//! * thresholded persistence of positive detections ([`ResultSink`])
//!
//! Proteins are routed into one of two [`Lane`]s: the domain-featured lane when structural
//! domain comparisons carry signal, otherwise the fallback lane which uses embeddings only.
//! The [`ScreeningPipeline`] drives both lanes, one after the other.
//!
mod accumulator;
mod classifier;
mod collaborators;
mod config;
mod domain;
mod embedding;
mod ensemble;
mod error;
pub mod features;
mod lane;
mod pipeline;
mod sink;
mod structure;

pub use self::accumulator::{BatchAccumulator, ClassificationWindow, PendingProtein};
pub use self::classifier::{
    ClassifierSpec, LayoutSlot, ProbabilisticClassifier, CLASSIFIER_SCHEMA_VERSION,
    PRECURSOR_CLASS, TARGET_CLASS, UNKNOWN_CLASS,
};
pub use self::collaborators::{
    DomainAligner, DomainDetector, RetryPolicy, SequenceReader, RECORD_SCHEMA_VERSION,
};
pub use self::config::ScreenConfig;
pub use self::domain::{
    label_domains, DetectedDomain, DomainComparison, DomainDetections, DomainLabel, DomainType,
    KnownScores,
};
pub use self::embedding::{prepare_sequence, EmbeddingStage, SequenceEmbedder, END_TOKEN_MARGIN};
pub use self::ensemble::{EnsembleStage, Prediction};
pub use self::error::{ClassifierError, ProteinIssue, Result, ScreenError};
pub use self::features::{DomainFeatures, FeatureVector, EVIDENCE_THRESHOLD};
pub use self::lane::{Lane, LaneModels, LaneReport};
pub use self::pipeline::{LanePartition, RunSummary, ScreeningPipeline};
pub use self::sink::{output_name, Decision, ResultSink};
pub use self::structure::{Structure, StructureFormat};
