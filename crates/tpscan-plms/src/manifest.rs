use crate::classifier::LogisticClassifier;
use crate::embedder::{ModelSource, OnnxEmbedder, DEFAULT_OUTPUT};
use anyhow::{anyhow, Context, Result};
use candle_core::Device;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tpscan_core::{
    ClassifierSpec, EmbeddingStage, EnsembleStage, Lane, LaneModels, ProbabilisticClassifier,
    RECORD_SCHEMA_VERSION,
};
use tracing::info;

pub const MANIFEST_FILE: &str = "ensemble.json";

/// `ensemble.json` of a lane directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnsembleManifest {
    pub schema_version: u32,
    pub embedder: ModelSource,
    /// Output of the embedder holding the per-token hidden state.
    #[serde(default)]
    pub embedder_output: Option<String>,
    /// Member names in application order; each has `<name>.json` and `<name>.safetensors`.
    pub members: Vec<String>,
}

impl EnsembleManifest {
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let manifest: EnsembleManifest = serde_json::from_str(&content)
            .with_context(|| format!("Malformed manifest {}", path.display()))?;
        if manifest.schema_version != RECORD_SCHEMA_VERSION {
            return Err(anyhow!(
                "{}: unsupported schema version {} (expected {})",
                path.display(),
                manifest.schema_version,
                RECORD_SCHEMA_VERSION
            ));
        }
        if manifest.members.is_empty() {
            return Err(anyhow!("{}: no members", path.display()));
        }
        Ok(manifest)
    }

    pub fn output(&self) -> &str {
        self.embedder_output.as_deref().unwrap_or(DEFAULT_OUTPUT)
    }
}

/// Load the classifiers of a lane directory in manifest order.
pub fn load_ensemble(dir: &Path, lane: Lane, device: &Device) -> Result<EnsembleStage> {
    let manifest = EnsembleManifest::read(dir)?;
    let mut members: Vec<Box<dyn ProbabilisticClassifier>> =
        Vec::with_capacity(manifest.members.len());
    for name in &manifest.members {
        let spec = ClassifierSpec::from_json_file(dir.join(format!("{name}.json")))
            .with_context(|| format!("Failed to load classifier spec {name}"))?;
        let classifier =
            LogisticClassifier::load(spec, &dir.join(format!("{name}.safetensors")), device)?;
        members.push(Box::new(classifier));
    }
    info!(%lane, members = members.len(), dir = %dir.display(), "loaded ensemble");
    Ok(EnsembleStage::new(lane, members)?)
}

/// Load the embedder and the ensemble of a lane directory.
pub fn load_lane(dir: &Path, lane: Lane, max_len: usize, cpu: bool) -> Result<LaneModels> {
    let manifest = EnsembleManifest::read(dir)?;
    let device = crate::device(cpu, lane)?;
    info!(%lane, device = ?device, "classifier device selected");
    let ensemble = load_ensemble(dir, lane, &device)?;
    let embedder = OnnxEmbedder::load(&manifest.embedder, dir, manifest.output(), cpu)?;
    Ok(LaneModels::new(
        EmbeddingStage::new(Box::new(embedder), max_len),
        ensemble,
    ))
}
