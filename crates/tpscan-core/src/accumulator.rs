//! Batch accumulation for one lane.
//!
//! Sequences are buffered until an embedding batch is full, then embedded. Embedding blocks are
//! buffered in a [`ClassificationWindow`] until it holds a classification batch worth of blocks.
//! The i-th row of the window always belongs to the i-th id and the i-th feature set.

use crate::embedding::EmbeddingStage;
use crate::error::ScreenError;
use crate::features::DomainFeatures;
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use tracing::debug;

/// A protein waiting to be embedded.
#[derive(Debug, Clone)]
pub struct PendingProtein {
    pub id: String,
    pub sequence: String,
    /// Present in the domain-featured lane only.
    pub features: Option<DomainFeatures>,
}

/// Embedded proteins waiting for classification.
#[derive(Debug, Default)]
pub struct ClassificationWindow {
    pub ids: Vec<String>,
    pub embeddings: Vec<Array2<f32>>,
    pub features: Vec<Option<DomainFeatures>>,
}

impl ClassificationWindow {
    /// Number of embedded proteins in the window.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of embedding batches in the window.
    pub fn blocks(&self) -> usize {
        self.embeddings.len()
    }

    /// All embedding blocks stacked into one matrix, rows in window order.
    pub fn stacked(&self) -> Result<Array2<f32>, ScreenError> {
        let views: Vec<ArrayView2<'_, f32>> = self.embeddings.iter().map(|b| b.view()).collect();
        let stacked = concatenate(Axis(0), &views).map_err(|e| ScreenError::Embedding {
            batch: self.len(),
            message: format!("embedding blocks have different widths: {e}"),
        })?;
        if stacked.nrows() != self.len() {
            return Err(ScreenError::EmbeddingShape {
                rows: stacked.nrows(),
                expected: self.len(),
            });
        }
        Ok(stacked)
    }
}

/// BatchAccumulator
///
/// Buffers for one lane with explicit `add` / `finish` / `reset`. A window is handed out
/// whole and the accumulator starts the next one empty.
pub struct BatchAccumulator {
    embed_batch_size: usize,
    classify_batch_size: usize,
    pending: Vec<PendingProtein>,
    window: ClassificationWindow,
}

impl BatchAccumulator {
    pub fn new(embed_batch_size: usize, classify_batch_size: usize) -> Self {
        let embed_batch_size = embed_batch_size.max(1);
        Self {
            embed_batch_size,
            classify_batch_size: classify_batch_size.max(1),
            pending: Vec::with_capacity(embed_batch_size),
            window: ClassificationWindow::default(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Add a protein. Returns a classification window once it holds `classify_batch_size`
    /// embedding blocks.
    pub fn add(
        &mut self,
        protein: PendingProtein,
        stage: &mut EmbeddingStage,
    ) -> Result<Option<ClassificationWindow>, ScreenError> {
        self.pending.push(protein);
        if self.pending.len() >= self.embed_batch_size {
            self.flush_embeddings(stage)?;
        }
        if self.window.blocks() >= self.classify_batch_size {
            return Ok(Some(self.take_window()));
        }
        Ok(None)
    }

    /// The lane is exhausted: embed what is pending and hand out the last window, if any.
    pub fn finish(
        &mut self,
        stage: &mut EmbeddingStage,
    ) -> Result<Option<ClassificationWindow>, ScreenError> {
        if !self.pending.is_empty() {
            self.flush_embeddings(stage)?;
        }
        if self.window.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.take_window()))
    }

    /// Embed every pending sequence as one batch and move the proteins into the window.
    pub fn flush_embeddings(&mut self, stage: &mut EmbeddingStage) -> Result<(), ScreenError> {
        let batch = std::mem::take(&mut self.pending);
        if batch.is_empty() {
            return Ok(());
        }
        let sequences: Vec<String> = batch.iter().map(|p| p.sequence.clone()).collect();
        let block = match stage.embed(&sequences) {
            Ok(block) => block,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };
        debug!(
            rows = block.nrows(),
            blocks = self.window.blocks() + 1,
            "embedding batch added to window"
        );
        self.window.embeddings.push(block);
        for protein in batch {
            self.window.ids.push(protein.id);
            self.window.features.push(protein.features);
        }
        Ok(())
    }

    pub fn take_window(&mut self) -> ClassificationWindow {
        std::mem::take(&mut self.window)
    }

    /// Drop all buffered state.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.window = ClassificationWindow::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::SequenceEmbedder;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Embeds a sequence as `[len, first residue code]` and records batch sizes.
    struct RecordingEmbedder {
        batches: Rc<RefCell<Vec<usize>>>,
    }

    impl SequenceEmbedder for RecordingEmbedder {
        fn embed(&mut self, sequences: &[String]) -> anyhow::Result<Array2<f32>> {
            self.batches.borrow_mut().push(sequences.len());
            Ok(Array2::from_shape_fn((sequences.len(), 2), |(i, j)| {
                if j == 0 {
                    sequences[i].len() as f32
                } else {
                    sequences[i].as_bytes()[0] as f32
                }
            }))
        }
    }

    fn stage() -> (EmbeddingStage, Rc<RefCell<Vec<usize>>>) {
        let batches = Rc::new(RefCell::new(Vec::new()));
        let embedder = RecordingEmbedder {
            batches: batches.clone(),
        };
        (EmbeddingStage::new(Box::new(embedder), 1022), batches)
    }

    fn protein(i: usize) -> PendingProtein {
        PendingProtein {
            id: format!("P{i}"),
            sequence: "M".repeat(i + 1),
            features: None,
        }
    }

    #[test]
    fn test_embedding_batches() {
        let (mut stage, batches) = stage();
        let mut acc = BatchAccumulator::new(4, 4096);
        for i in 0..10 {
            assert!(acc.add(protein(i), &mut stage).unwrap().is_none());
        }
        assert_eq!(acc.pending_len(), 2);
        let window = acc.finish(&mut stage).unwrap().unwrap();
        assert_eq!(*batches.borrow(), vec![4, 4, 2]);
        assert_eq!(window.len(), 10);
        assert_eq!(acc.window_len(), 0);
        assert_eq!(acc.pending_len(), 0);
    }

    #[test]
    fn test_window_rows_follow_ids() {
        let (mut stage, _) = stage();
        let mut acc = BatchAccumulator::new(3, 100);
        for i in 0..7 {
            acc.add(protein(i), &mut stage).unwrap();
        }
        let window = acc.finish(&mut stage).unwrap().unwrap();
        let stacked = window.stacked().unwrap();
        for (row, id) in window.ids.iter().enumerate() {
            let i: usize = id[1..].parse().unwrap();
            assert_eq!(stacked[[row, 0]], (i + 1) as f32);
        }
    }

    #[test]
    fn test_classification_windows() {
        let (mut stage, batches) = stage();
        // windows close after four embedding batches of two
        let mut acc = BatchAccumulator::new(2, 4);
        let mut windows = Vec::new();
        for i in 0..9 {
            if let Some(w) = acc.add(protein(i), &mut stage).unwrap() {
                windows.push(w);
            }
        }
        if let Some(w) = acc.finish(&mut stage).unwrap() {
            windows.push(w);
        }
        let sizes: Vec<usize> = windows.iter().map(ClassificationWindow::len).collect();
        assert_eq!(sizes, vec![8, 1]);
        assert_eq!(windows[0].blocks(), 4);
        assert_eq!(*batches.borrow(), vec![2, 2, 2, 2, 1]);
        assert_eq!(windows[1].ids, vec!["P8".to_string()]);
    }

    #[test]
    fn test_finish_on_empty_lane() {
        let (mut stage, batches) = stage();
        let mut acc = BatchAccumulator::new(4, 4);
        assert!(acc.finish(&mut stage).unwrap().is_none());
        assert!(batches.borrow().is_empty());
    }

    #[test]
    fn test_reset() {
        let (mut stage, _) = stage();
        let mut acc = BatchAccumulator::new(2, 10);
        for i in 0..3 {
            acc.add(protein(i), &mut stage).unwrap();
        }
        acc.reset();
        assert_eq!(acc.pending_len(), 0);
        assert_eq!(acc.window_len(), 0);
        assert!(acc.finish(&mut stage).unwrap().is_none());
    }
}
