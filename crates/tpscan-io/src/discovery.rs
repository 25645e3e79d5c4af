//! Structure discovery.
use anyhow::{Context, Result};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tpscan_core::Structure;
use tracing::{debug, info, warn};

/// Template structures of known domains. They share the structures directory with the
/// inputs but are never screened.
pub const REFERENCE_STRUCTURES: [&str; 3] = ["1ps1.pdb", "5eat.pdb", "3p5r.pdb"];

/// File stems may carry isoform decorations such as `Q9X7Y6(1)` or `Q9X-7Y6` that the
/// candidate list spells without.
pub fn normalize_id(stem: &str) -> String {
    stem.chars()
        .filter(|c| !matches!(c, '(' | ')' | '-'))
        .collect()
}

/// Protein ids to restrict a run to.
#[derive(Debug, Clone, Default)]
pub struct CandidateIds(HashSet<String>);

impl CandidateIds {
    /// Read the ids of `id_column` from a CSV file with a header row.
    pub fn from_csv(path: &Path, id_column: &str) -> Result<Self> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()
            .with_context(|| format!("Failed to read candidate CSV {}", path.display()))?;
        let column = df
            .column(id_column)
            .with_context(|| format!("Candidate CSV has no `{id_column}` column"))?
            .cast(&DataType::String)?;
        let ids: HashSet<String> = column
            .str()?
            .into_iter()
            .flatten()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        info!(path = %path.display(), candidates = ids.len(), "loaded candidate ids");
        Ok(Self(ids))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if the raw stem or its normalized form is a candidate.
    pub fn matches(&self, stem: &str) -> bool {
        self.0.contains(stem) || self.0.contains(&normalize_id(stem))
    }
}

impl FromIterator<String> for CandidateIds {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// List the PDB / mmCIF files of `dir` to screen, sorted by path.
///
/// Reference templates are skipped, and so is every file whose stem is not a candidate when
/// a candidate list is given. When two files share a stem the first path wins.
pub fn discover_structures(dir: &Path, candidates: Option<&CandidateIds>) -> Result<Vec<Structure>> {
    let mut paths = fs::read_dir(dir)
        .with_context(|| format!("Failed to read structures directory {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut structures = Vec::new();
    for path in paths {
        if !path.is_file() {
            continue;
        }
        let Some(structure) = Structure::from_path(&path) else {
            continue;
        };
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if REFERENCE_STRUCTURES.contains(&file_name) {
            debug!(file = file_name, "skipping reference structure");
            continue;
        }
        if let Some(candidates) = candidates {
            if !candidates.matches(&structure.id) {
                continue;
            }
        }
        if let Some(&first) = seen.get(&structure.id) {
            let kept: &Structure = &structures[first];
            warn!(
                structure_id = %structure.id,
                kept = %kept.path.display(),
                skipped = %path.display(),
                "duplicate structure id"
            );
            continue;
        }
        seen.insert(structure.id.clone(), structures.len());
        structures.push(structure);
    }
    info!(dir = %dir.display(), structures = structures.len(), "structures to screen");
    Ok(structures)
}
