//! Typed record files for the outputs of the domain detector and the domain aligner.
//!
//! Both are JSON objects carrying a `schema_version`; unknown fields are rejected.
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tpscan_core::{
    DomainAligner, DomainComparison, DomainDetections, DomainDetector, ScreenError, Structure,
    RECORD_SCHEMA_VERSION,
};
use tracing::{debug, info};

fn check_version(what: &str, found: u32) -> Result<(), ScreenError> {
    if found != RECORD_SCHEMA_VERSION {
        return Err(ScreenError::SchemaVersion {
            what: what.to_string(),
            found,
            expected: RECORD_SCHEMA_VERSION,
        });
    }
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ScreenError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ScreenError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

/// Structure id -> detected domains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectionRecord {
    pub schema_version: u32,
    pub detections: DomainDetections,
}

impl DetectionRecord {
    pub fn new(detections: DomainDetections) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            detections,
        }
    }

    pub fn read(path: &Path) -> Result<Self, ScreenError> {
        let record: Self = read_json(path)?;
        check_version(&format!("detection record {}", path.display()), record.schema_version)?;
        Ok(record)
    }

    pub fn write(&self, path: &Path) -> Result<(), ScreenError> {
        write_json(path, self)
    }
}

/// Structure id -> detected module id -> known module id -> similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComparisonRecord {
    pub schema_version: u32,
    pub comparisons: DomainComparison,
}

impl ComparisonRecord {
    pub fn new(comparisons: DomainComparison) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            comparisons,
        }
    }

    /// Scores must lie in `[0, 1]`.
    pub fn read(path: &Path) -> Result<Self, ScreenError> {
        let record: Self = read_json(path)?;
        let what = format!("comparison record {}", path.display());
        check_version(&what, record.schema_version)?;
        for (structure_id, modules) in &record.comparisons {
            for (module_id, scores) in modules {
                if let Some((known, score)) =
                    scores.iter().find(|(_, s)| !(0.0..=1.0).contains(*s))
                {
                    return Err(ScreenError::InvalidRecord {
                        what,
                        message: format!(
                            "score {score} of {structure_id}/{module_id} vs {known} is outside [0, 1]"
                        ),
                    });
                }
            }
        }
        Ok(record)
    }

    pub fn write(&self, path: &Path) -> Result<(), ScreenError> {
        write_json(path, self)
    }
}

/// Serves detections from a precomputed [`DetectionRecord`].
#[derive(Debug, Clone)]
pub struct RecordDetector {
    path: PathBuf,
}

impl RecordDetector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DomainDetector for RecordDetector {
    /// Entries for structures outside `structures` are dropped.
    fn detect(&self, structures: &[Structure]) -> Result<DomainDetections, ScreenError> {
        let mut record = DetectionRecord::read(&self.path)?;
        let total = record.detections.len();
        let detections: DomainDetections = structures
            .iter()
            .filter_map(|s| record.detections.remove_entry(&s.id))
            .collect();
        info!(path = %self.path.display(), structures = detections.len(), "loaded domain detections");
        debug!(unused = total - detections.len(), "detections without a matching structure");
        Ok(detections)
    }
}

/// Serves comparisons from a precomputed [`ComparisonRecord`].
#[derive(Debug, Clone)]
pub struct RecordAligner {
    path: PathBuf,
}

impl RecordAligner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DomainAligner for RecordAligner {
    fn align(&self, detections: &DomainDetections) -> Result<DomainComparison, ScreenError> {
        let mut record = ComparisonRecord::read(&self.path)?;
        let comparison: DomainComparison = detections
            .keys()
            .filter_map(|id| record.comparisons.remove_entry(id))
            .collect();
        info!(path = %self.path.display(), structures = comparison.len(), "loaded domain comparisons");
        Ok(comparison)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;
    use tpscan_core::{DetectedDomain, DomainType};
    use tpscan_test_data::TestFile;

    #[test]
    fn test_read_fixtures() -> anyhow::Result<()> {
        let (detections, _d) = TestFile::detections().create_temp()?;
        let (comparisons, _c) = TestFile::comparisons().create_temp()?;
        let detections = DetectionRecord::read(Path::new(&detections))?;
        let comparisons = ComparisonRecord::read(Path::new(&comparisons))?;

        let dimer = &detections.detections["tps_dimer"];
        assert_eq!(dimer.len(), 3);
        assert_eq!(dimer[1].domain_type, DomainType::Beta);
        assert_eq!(
            detections.detections["monomer"][0].domain_type,
            DomainType::AlphaWeird
        );
        assert_eq!(
            comparisons.comparisons["tps_dimer"]["tps_dimer_alpha_0"]["1ps1_alpha"],
            0.82
        );
        Ok(())
    }

    #[test]
    fn test_write_then_serve() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("detections.json");
        let detections = HashMap::from([
            (
                "P1".to_string(),
                vec![DetectedDomain {
                    domain_type: DomainType::Gamma,
                    module_id: "P1_gamma_0".to_string(),
                }],
            ),
            ("P2".to_string(), vec![]),
        ]);
        DetectionRecord::new(detections).write(&path)?;

        let structures = vec![Structure::from_path("in/P1.pdb").unwrap()];
        let served = RecordDetector::new(&path).detect(&structures)?;
        assert_eq!(served.len(), 1);
        assert_eq!(served["P1"][0].module_id, "P1_gamma_0");
        Ok(())
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("detections.json");
        std::fs::write(
            &path,
            r#"{"schema_version": 1, "detections": {"P1": [{"domain_type": "beta", "module_id": "m", "score": 1}]}}"#,
        )
        .unwrap();
        assert!(matches!(
            DetectionRecord::read(&path),
            Err(ScreenError::Json(_))
        ));
    }

    #[test]
    fn test_version_and_range_checked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("comparisons.json");
        std::fs::write(&path, r#"{"schema_version": 2, "comparisons": {}}"#).unwrap();
        assert!(matches!(
            ComparisonRecord::read(&path),
            Err(ScreenError::SchemaVersion { found: 2, .. })
        ));

        std::fs::write(
            &path,
            r#"{"schema_version": 1, "comparisons": {"P1": {"m": {"k": 1.5}}}}"#,
        )
        .unwrap();
        assert!(matches!(
            ComparisonRecord::read(&path),
            Err(ScreenError::InvalidRecord { .. })
        ));
    }
}
