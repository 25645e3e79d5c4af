//! Aggregation of the per-protein result files into one table.
use anyhow::{Context, Result};
use itertools::Itertools;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Fold every `<id>.json` of `results_root` into a CSV with an `ID` column and one column per
/// class, classes sorted by name. Returns the number of rows written.
///
/// With `delete_individual_files` the JSON files are removed once the CSV is written.
pub fn gather_detections(
    results_root: &Path,
    output_csv: &Path,
    delete_individual_files: bool,
) -> Result<usize> {
    let files: Vec<PathBuf> = fs::read_dir(results_root)
        .with_context(|| format!("Failed to read results directory {}", results_root.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .sorted()
        .collect();

    let mut ids = Vec::with_capacity(files.len());
    let mut records: Vec<BTreeMap<String, f32>> = Vec::with_capacity(files.len());
    for path in &files {
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!(path = %path.display(), "skipping result file with a non UTF-8 name");
            continue;
        };
        let content = fs::read_to_string(path)?;
        let record: BTreeMap<String, f32> = serde_json::from_str(&content)
            .with_context(|| format!("Malformed result file {}", path.display()))?;
        ids.push(id.to_string());
        records.push(record);
    }
    let classes: BTreeSet<&String> = records.iter().flat_map(|r| r.keys()).collect();

    let mut columns: Vec<Series> = Vec::with_capacity(classes.len() + 1);
    columns.push(Series::new(PlSmallStr::from("ID"), ids));
    for class in &classes {
        let values: Vec<Option<f32>> = records.iter().map(|r| r.get(*class).copied()).collect();
        columns.push(Series::new(PlSmallStr::from(class.as_str()), values));
    }
    let mut df = DataFrame::new(columns.into_iter().map(Into::into).collect())?;

    if let Some(parent) = output_csv.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(output_csv)
        .with_context(|| format!("Failed to create {}", output_csv.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    info!(rows = df.height(), classes = classes.len(), output = %output_csv.display(), "gathered detections");

    if delete_individual_files {
        for path in &files {
            fs::remove_file(path)?;
        }
        if fs::read_dir(results_root)?.next().is_none() {
            fs::remove_dir(results_root)?;
        }
    }
    Ok(df.height())
}
