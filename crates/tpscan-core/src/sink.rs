//! Thresholding of averaged predictions and persistence of positive detections.

use crate::classifier::{PRECURSOR_CLASS, TARGET_CLASS};
use crate::ensemble::Prediction;
use crate::error::ScreenError;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File stem used for a protein id. Path separators are not allowed in ids on disk.
pub fn output_name(id: &str) -> String {
    id.replace('/', "")
}

/// Outcome of thresholding one protein.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Written to the given file.
    Positive(PathBuf),
    Negative,
}

/// ResultSink
///
/// One JSON object (class -> probability) per positive protein in `root`. Negatives leave
/// no trace. Writing the same output name twice is an error.
#[derive(Debug)]
pub struct ResultSink {
    root: PathBuf,
    threshold: f32,
    detect_precursors: bool,
    written: HashSet<String>,
    positives: usize,
    negatives: usize,
}

impl ResultSink {
    /// Creates `root` if needed.
    pub fn create(
        root: impl Into<PathBuf>,
        threshold: f32,
        detect_precursors: bool,
    ) -> Result<Self, ScreenError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            threshold,
            detect_precursors,
            written: HashSet::new(),
            positives: 0,
            negatives: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn positives(&self) -> usize {
        self.positives
    }

    pub fn negatives(&self) -> usize {
        self.negatives
    }

    /// A probability equal to the threshold counts as a detection.
    pub fn is_positive(&self, prediction: &Prediction) -> bool {
        let meets = |class: &str| {
            prediction
                .get(class)
                .is_some_and(|probability| probability >= self.threshold)
        };
        meets(TARGET_CLASS) || (self.detect_precursors && meets(PRECURSOR_CLASS))
    }

    pub fn record(&mut self, id: &str, prediction: &Prediction) -> Result<Decision, ScreenError> {
        if !self.is_positive(prediction) {
            self.negatives += 1;
            return Ok(Decision::Negative);
        }
        let name = output_name(id);
        if !self.written.insert(name.clone()) {
            return Err(ScreenError::DuplicateOutput(id.to_string()));
        }
        let path = self.root.join(format!("{name}.json"));
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, prediction)?;
        writer.flush()?;
        debug!(protein_id = id, path = %path.display(), "positive detection written");
        self.positives += 1;
        Ok(Decision::Positive(path))
    }
}
