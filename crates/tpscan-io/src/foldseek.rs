//! Domain alignment with Foldseek.
//!
//! Detected domain structures are searched against the known domain structures with
//! `foldseek easy-search`; for every (detected, known) pair the best value of one score
//! column is kept.
use crate::command::run_with_timeout;
use anyhow::{anyhow, Context, Result};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use strum::{Display, EnumIter, EnumString};
use tpscan_core::{
    DomainAligner, DomainComparison, DomainDetections, KnownScores, RetryPolicy, ScreenError,
};
use tracing::{debug, info};

/// `--format-output` of the search; the result file has these columns and no header.
pub const FOLDSEEK_COLUMNS: [&str; 16] = [
    "query", "target", "fident", "alnlen", "mismatch", "gapopen", "qstart", "qend", "tstart",
    "tend", "evalue", "bits", "alntmscore", "qtmscore", "ttmscore", "lddt",
];

/// Foldseek column used as the similarity between two domains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ScoreColumn {
    #[default]
    Alntmscore,
    Qtmscore,
    Ttmscore,
    Lddt,
}

/// Foldseek names entries by file name.
fn module_id(name: &str) -> &str {
    [".pdb", ".cif"]
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(name)
}

fn column_at<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    FOLDSEEK_COLUMNS
        .iter()
        .position(|c| *c == name)
        .and_then(|idx| df.select_at_idx(idx))
        .ok_or_else(|| anyhow!("Missing Foldseek column {name}"))
}

/// Read a Foldseek result file into detected module id -> known module id -> best score.
pub fn parse_alignments(path: &Path, score: ScoreColumn) -> Result<HashMap<String, KnownScores>> {
    let mut best: HashMap<String, KnownScores> = HashMap::new();
    if std::fs::metadata(path)?.len() == 0 {
        return Ok(best);
    }
    let df = CsvReadOptions::default()
        .with_has_header(false)
        .map_parse_options(|mut o| {
            o.separator = b'\t';
            o
        })
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("Failed to read Foldseek output {}", path.display()))?;
    if df.width() != FOLDSEEK_COLUMNS.len() {
        return Err(anyhow!(
            "Expected {} Foldseek columns, found {}",
            FOLDSEEK_COLUMNS.len(),
            df.width()
        ));
    }
    let queries = column_at(&df, "query")?.cast(&DataType::String)?;
    let targets = column_at(&df, "target")?.cast(&DataType::String)?;
    let scores = column_at(&df, &score.to_string())?.cast(&DataType::Float64)?;

    let rows = queries
        .str()?
        .into_iter()
        .zip(targets.str()?.into_iter())
        .zip(scores.f64()?.into_iter());
    for ((query, target), value) in rows {
        let (Some(query), Some(target), Some(value)) = (query, target, value) else {
            continue;
        };
        let slot = best
            .entry(module_id(query).to_string())
            .or_default()
            .entry(module_id(target).to_string())
            .or_insert(f32::MIN);
        *slot = slot.max(value as f32);
    }
    debug!(path = %path.display(), queries = best.len(), column = %score, "parsed alignments");
    Ok(best)
}

/// [`DomainAligner`] running `foldseek easy-search`.
#[derive(Debug, Clone)]
pub struct FoldseekAligner {
    pub foldseek: PathBuf,
    /// Structures of the detected domains, one file per module id.
    pub detected_domains_dir: PathBuf,
    pub known_domains_dir: PathBuf,
    /// Parent of the temporary search directory; the system temp dir when unset.
    pub work_dir: Option<PathBuf>,
    pub score: ScoreColumn,
    pub retry: RetryPolicy,
}

impl FoldseekAligner {
    fn command(&self, result: &Path, tmp: &Path) -> Command {
        let mut command = Command::new(&self.foldseek);
        command
            .arg("easy-search")
            .arg(&self.detected_domains_dir)
            .arg(&self.known_domains_dir)
            .arg(result)
            .arg(tmp)
            .args(["--max-seqs", "5000", "-e", "1", "-s", "10", "--exhaustive-search"])
            .arg("--format-output")
            .arg(FOLDSEEK_COLUMNS.join(","));
        command
    }

    /// Search and parse; both steps are retried together.
    fn search(&self) -> Result<HashMap<String, KnownScores>, ScreenError> {
        let workspace = match &self.work_dir {
            Some(dir) => tempfile::Builder::new().prefix("foldseek").tempdir_in(dir)?,
            None => tempfile::Builder::new().prefix("foldseek").tempdir()?,
        };
        let result = workspace.path().join("domain_alignments.tsv");
        let tmp = workspace.path().join("tmp");
        self.retry.run("domain aligner", |timeout| {
            run_with_timeout(&mut self.command(&result, &tmp), timeout)?;
            parse_alignments(&result, self.score)
        })
    }
}

impl DomainAligner for FoldseekAligner {
    fn align(&self, detections: &DomainDetections) -> Result<DomainComparison, ScreenError> {
        if detections.values().all(Vec::is_empty) {
            info!("no detected domains, skipping alignment");
            return Ok(DomainComparison::new());
        }
        info!(
            detected = %self.detected_domains_dir.display(),
            known = %self.known_domains_dir.display(),
            "comparing detected domains to the known ones"
        );
        let mut best = self.search()?;
        let comparison: DomainComparison = detections
            .iter()
            .map(|(structure_id, domains)| {
                let modules = domains
                    .iter()
                    .map(|d| {
                        let scores = best.remove(&d.module_id).unwrap_or_default();
                        (d.module_id.clone(), scores)
                    })
                    .collect();
                (structure_id.clone(), modules)
            })
            .collect();
        info!(structures = comparison.len(), "compared detected domains");
        Ok(comparison)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpscan_test_data::TestFile;

    #[test]
    fn test_best_score_per_pair() -> Result<()> {
        let (tsv, _handle) = TestFile::foldseek_alignments().create_temp()?;
        let best = parse_alignments(Path::new(&tsv), ScoreColumn::Alntmscore)?;
        assert_eq!(best.len(), 2);
        let alpha = &best["tps_dimer_alpha_0"];
        assert!((alpha["1ps1_alpha"] - 0.82).abs() < 1e-6);
        assert!((alpha["5eat_alpha"] - 0.64).abs() < 1e-6);

        let lddt = parse_alignments(Path::new(&tsv), ScoreColumn::Lddt)?;
        assert!((lddt["tps_dimer_alpha_0"]["1ps1_alpha"] - 0.72).abs() < 1e-6);
        assert!((lddt["tps_dimer_beta_1"]["3p5r_beta"] - 0.52).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_empty_result() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        assert!(parse_alignments(file.path(), ScoreColumn::Qtmscore)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_score_column_names() {
        assert_eq!(ScoreColumn::default().to_string(), "alntmscore");
        assert_eq!("lddt".parse::<ScoreColumn>().unwrap(), ScoreColumn::Lddt);
        assert!("evalue".parse::<ScoreColumn>().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_aligner_with_stub_foldseek() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        use tpscan_core::{DetectedDomain, DomainType};

        let dir = tempfile::tempdir()?;
        let fixture = TestFile::foldseek_alignments().write_to(dir.path())?;
        // `easy-search <query> <target> <result> <tmp> ...`
        let stub = dir.path().join("foldseek");
        std::fs::write(
            &stub,
            format!("#!/bin/sh\ncp '{}' \"$4\"\n", fixture.display()),
        )?;
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755))?;

        let aligner = FoldseekAligner {
            foldseek: stub,
            detected_domains_dir: dir.path().join("detected"),
            known_domains_dir: dir.path().join("known"),
            work_dir: Some(dir.path().to_path_buf()),
            score: ScoreColumn::Alntmscore,
            // a freshly written executable can briefly be busy
            retry: RetryPolicy::new(3, None).with_backoff(std::time::Duration::from_millis(50)),
        };
        let detections = DomainDetections::from([(
            "tps_dimer".to_string(),
            vec![
                DetectedDomain {
                    domain_type: DomainType::Alpha,
                    module_id: "tps_dimer_alpha_0".to_string(),
                },
                DetectedDomain {
                    domain_type: DomainType::Gamma,
                    module_id: "tps_dimer_gamma_3".to_string(),
                },
            ],
        )]);
        let comparison = aligner.align(&detections)?;
        let modules = &comparison["tps_dimer"];
        assert!((modules["tps_dimer_alpha_0"]["1ps1_alpha"] - 0.82).abs() < 1e-6);
        assert!(modules["tps_dimer_gamma_3"].is_empty());
        Ok(())
    }
}
