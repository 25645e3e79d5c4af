//! Error types for the screening core.
//!
//! Three levels of failure are kept apart:
//! * [`ScreenError`] is systemic and aborts the run.
//! * [`ProteinIssue`] concerns a single protein; it is logged and the protein is skipped or rerouted.
//! * [`ClassifierError`] concerns one ensemble member on one batch; the member does not contribute.

use crate::lane::Lane;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScreenError>;

#[derive(Error, Debug)]
pub enum ScreenError {
    #[error("{collaborator} failed after {attempts} attempt(s): {message}")]
    Collaborator {
        collaborator: &'static str,
        attempts: u32,
        message: String,
    },

    #[error("invalid classifier spec `{name}`: {message}")]
    InvalidSpec { name: String, message: String },

    #[error("unsupported schema version {found} in {what} (expected {expected})")]
    SchemaVersion {
        what: String,
        found: u32,
        expected: u32,
    },

    #[error("invalid {what}: {message}")]
    InvalidRecord { what: String, message: String },

    #[error("embedding failed for a batch of {batch} sequence(s): {message}")]
    Embedding { batch: usize, message: String },

    #[error("embedding returned {rows} row(s) for {expected} sequence(s)")]
    EmbeddingShape { rows: usize, expected: usize },

    #[error("every classifier of the {lane} ensemble failed on batch {batch}")]
    EnsembleExhausted { lane: Lane, batch: usize },

    #[error("duplicate output id `{0}`")]
    DuplicateOutput(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A reason a single protein left its lane or the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProteinIssue {
    #[error("structure does not contain any sequence")]
    NoSequence,

    #[error("structure could not be read: {0}")]
    Unreadable(String),

    #[error("no meaningful domain comparison (best similarity {best:.3})")]
    WeakDomainEvidence { best: f32 },
}

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("expected {expected} input features, got {found}")]
    FeatureWidth { expected: usize, found: usize },

    #[error("embedding index {index} out of range for embedding width {width}")]
    ProjectionIndex { index: usize, width: usize },

    #[error("expected output of shape ({rows}, {classes}), got ({found_rows}, {found_classes})")]
    OutputShape {
        rows: usize,
        classes: usize,
        found_rows: usize,
        found_classes: usize,
    },

    #[error("inference error: {0}")]
    Inference(String),
}
