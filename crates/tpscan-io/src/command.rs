//! External tools: a subprocess runner with a timeout, and the domain-detector adapter.
use crate::records::DetectionRecord;
use anyhow::{anyhow, bail, Context, Result};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tpscan_core::{DomainDetections, DomainDetector, RetryPolicy, ScreenError, Structure};
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer)?;
        Ok(buffer)
    })
}

fn collect(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>> {
    match handle {
        Some(handle) => Ok(handle
            .join()
            .map_err(|_| anyhow!("Output reader thread panicked"))??),
        None => Ok(Vec::new()),
    }
}

/// Run `command` to completion, killing it once `timeout` has elapsed.
///
/// A non-zero exit status is an error carrying the tool's stderr.
pub fn run_with_timeout(command: &mut Command, timeout: Option<Duration>) -> Result<Output> {
    let program = command.get_program().to_string_lossy().into_owned();
    debug!(program, ?timeout, "spawning");
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to execute {program}"))?;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                child.kill()?;
                child.wait()?;
                bail!("{program} timed out after {limit:?}");
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    let output = Output {
        status,
        stdout: collect(stdout)?,
        stderr: collect(stderr)?,
    };
    if !output.status.success() {
        bail!(
            "{program} failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output)
}

/// Invocation of the external domain detector.
///
/// The detector scans `structures_dir` for the candidates of `candidates_csv`, stores the
/// detected domain structures in `domains_output_dir` and writes a [`DetectionRecord`] to
/// `detections_output`.
#[derive(Debug, Clone)]
pub struct DetectorCommand {
    pub program: PathBuf,
    /// Leading arguments, e.g. a script or module name.
    pub args: Vec<String>,
    pub structures_dir: PathBuf,
    pub candidates_csv: PathBuf,
    pub id_column: String,
    pub n_jobs: usize,
    pub bfactor_confidence: bool,
    pub domains_output_dir: PathBuf,
    pub detections_output: PathBuf,
}

impl DetectorCommand {
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--needed-proteins-csv-path")
            .arg(&self.candidates_csv)
            .arg("--csv-id-column")
            .arg(&self.id_column)
            .arg("--n-jobs")
            .arg(self.n_jobs.to_string())
            .arg("--input-directory-with-structures")
            .arg(&self.structures_dir);
        if self.bfactor_confidence {
            command.arg("--is-bfactor-confidence");
        }
        command
            .arg("--detections-output-path")
            .arg(&self.detections_output)
            .arg("--detected-regions-root-path")
            .arg(&self.domains_output_dir)
            .arg("--domains-output-path")
            .arg(&self.domains_output_dir)
            .args([
                "--store-domains",
                "--recompute-existing-secondary-structure-residues",
                "--do-not-store-intermediate-files",
            ]);
        command
    }
}

/// [`DomainDetector`] backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    detector: DetectorCommand,
    retry: RetryPolicy,
}

impl CommandDetector {
    pub fn new(detector: DetectorCommand, retry: RetryPolicy) -> Self {
        Self { detector, retry }
    }
}

impl DomainDetector for CommandDetector {
    fn detect(&self, structures: &[Structure]) -> Result<DomainDetections, ScreenError> {
        info!(
            program = %self.detector.program.display(),
            structures = structures.len(),
            "detecting domains"
        );
        std::fs::create_dir_all(&self.detector.domains_output_dir)?;
        self.retry.run("domain detector", |timeout| {
            run_with_timeout(&mut self.detector.command(), timeout)
        })?;
        let mut record = DetectionRecord::read(&self.detector.detections_output)?;
        let detections: DomainDetections = structures
            .iter()
            .filter_map(|s| record.detections.remove_entry(&s.id))
            .collect();
        info!(structures = detections.len(), "detected domains");
        Ok(detections)
    }
}
