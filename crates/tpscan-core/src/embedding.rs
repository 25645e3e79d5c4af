//! Embedding stage: sequence preparation and batched calls to a protein language model.

use crate::error::{ProteinIssue, ScreenError};
use itertools::Itertools;
use ndarray::Array2;
use tracing::{debug, warn};

/// Positions kept free for the begin/end-of-sequence tokens when truncating.
pub const END_TOKEN_MARGIN: usize = 2;

/// A protein language model mapping sequences to fixed-width vectors.
pub trait SequenceEmbedder {
    /// One row per input sequence, in input order.
    fn embed(&mut self, sequences: &[String]) -> anyhow::Result<Array2<f32>>;
}

/// Pick the sequence to embed from the chains of one structure.
///
/// Chains are deduplicated keeping first-seen order and empty chains are dropped; when
/// several distinct sequences remain only the first is used. Sequences longer than
/// `max_len` keep their first `max_len - END_TOKEN_MARGIN` residues.
pub fn prepare_sequence(
    structure_id: &str,
    chains: Vec<String>,
    max_len: usize,
) -> Result<String, ProteinIssue> {
    let distinct: Vec<String> = chains
        .into_iter()
        .filter(|chain| !chain.is_empty())
        .unique()
        .collect();
    let count = distinct.len();
    let Some(sequence) = distinct.into_iter().next() else {
        return Err(ProteinIssue::NoSequence);
    };
    if count > 1 {
        warn!(
            structure_id,
            chains = count,
            "multiple chains are not supported, taking the first one"
        );
    }
    let residues = sequence.chars().count();
    if residues > max_len {
        let keep = max_len.saturating_sub(END_TOKEN_MARGIN);
        debug!(structure_id, residues, keep, "truncating sequence");
        return Ok(sequence.chars().take(keep).collect());
    }
    Ok(sequence)
}

/// Wraps the embedding model of a lane.
pub struct EmbeddingStage {
    embedder: Box<dyn SequenceEmbedder>,
    max_len: usize,
    calls: usize,
}

impl EmbeddingStage {
    pub fn new(embedder: Box<dyn SequenceEmbedder>, max_len: usize) -> Self {
        Self {
            embedder,
            max_len,
            calls: 0,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Number of model invocations so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn prepare(&self, structure_id: &str, chains: Vec<String>) -> Result<String, ProteinIssue> {
        prepare_sequence(structure_id, chains, self.max_len)
    }

    /// Embed one batch. The returned matrix has exactly one row per sequence.
    pub fn embed(&mut self, sequences: &[String]) -> Result<Array2<f32>, ScreenError> {
        debug!(batch = sequences.len(), "creating embeddings for batch");
        self.calls += 1;
        let block = self
            .embedder
            .embed(sequences)
            .map_err(|e| ScreenError::Embedding {
                batch: sequences.len(),
                message: format!("{e:#}"),
            })?;
        if block.nrows() != sequences.len() {
            return Err(ScreenError::EmbeddingShape {
                rows: block.nrows(),
                expected: sequences.len(),
            });
        }
        Ok(block)
    }
}
