//! ONNX protein language model used as the sequence embedder.
//!
//! Models exported from ESM-style checkpoints take `input_ids` and `attention_mask` and
//! return a per-token hidden state. Sequences are wrapped in `<cls> ... <eos>`, padded to
//! the longest sequence of the batch, and the hidden states of the residue positions are
//! averaged into one vector per sequence.
use anyhow::{anyhow, Context, Result};
use hf_hub::{api::sync::Api, Repo, RepoType};
use ndarray::{s, Array2, ArrayView3, Ix3};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;
use tpscan_core::SequenceEmbedder;
use tracing::{debug, info};

/// Hidden-state output read from the model when the manifest names none.
pub const DEFAULT_OUTPUT: &str = "last_hidden_state";

const MODEL_FILE: &str = "model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";

fn default_revision() -> String {
    "main".to_string()
}

/// Where the model and its tokenizer live. Both sources provide `model.onnx` and
/// `tokenizer.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case", deny_unknown_fields)]
pub enum ModelSource {
    /// A directory; relative paths are resolved against the manifest directory.
    Local { path: PathBuf },
    HuggingFace {
        repo: String,
        #[serde(default = "default_revision")]
        revision: String,
    },
}

impl ModelSource {
    /// Paths of the model and tokenizer files, downloading them when needed.
    pub fn resolve(&self, base_dir: &Path) -> Result<(PathBuf, PathBuf)> {
        match self {
            ModelSource::Local { path } => {
                let dir = base_dir.join(path);
                let model = dir.join(MODEL_FILE);
                let tokenizer = dir.join(TOKENIZER_FILE);
                for file in [&model, &tokenizer] {
                    if !file.is_file() {
                        return Err(anyhow!("Missing model file {}", file.display()));
                    }
                }
                Ok((model, tokenizer))
            }
            ModelSource::HuggingFace { repo, revision } => {
                info!(repo, revision, "fetching embedder from the hub");
                let api = Api::new()?;
                let repo = api.repo(Repo::with_revision(
                    repo.clone(),
                    RepoType::Model,
                    revision.clone(),
                ));
                Ok((repo.get(MODEL_FILE)?, repo.get(TOKENIZER_FILE)?))
            }
        }
    }
}

/// Ids of the tokens wrapped around and padded after every sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub cls: u32,
    pub eos: u32,
    pub pad: u32,
}

impl SpecialTokens {
    pub fn from_tokenizer(tokenizer: &Tokenizer) -> Result<Self> {
        let id = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| anyhow!("Tokenizer has no {token} token"))
        };
        Ok(Self {
            cls: id("<cls>")?,
            eos: id("<eos>")?,
            pad: id("<pad>")?,
        })
    }
}

/// Build `input_ids` and `attention_mask` for a batch of tokenized sequences.
///
/// Row `i` is `cls, tokens[i].., eos` followed by padding; the mask is 1 on every
/// non-padding position.
pub(crate) fn pad_batch(tokens: &[Vec<u32>], specials: SpecialTokens) -> (Array2<i64>, Array2<i64>) {
    let width = tokens.iter().map(Vec::len).max().unwrap_or(0) + 2;
    let mut ids = Array2::from_elem((tokens.len(), width), specials.pad as i64);
    let mut mask = Array2::zeros((tokens.len(), width));
    for (row, seq) in tokens.iter().enumerate() {
        ids[[row, 0]] = specials.cls as i64;
        for (col, &token) in seq.iter().enumerate() {
            ids[[row, col + 1]] = token as i64;
        }
        ids[[row, seq.len() + 1]] = specials.eos as i64;
        mask.slice_mut(s![row, ..seq.len() + 2]).fill(1);
    }
    (ids, mask)
}

/// Average the hidden states of positions `1..=lengths[i]` of each row.
///
/// Position 0 holds `<cls>` and position `lengths[i] + 1` holds `<eos>`; neither is part
/// of the sequence representation.
pub fn mean_pool(hidden: ArrayView3<'_, f32>, lengths: &[usize]) -> Result<Array2<f32>> {
    let (batch, positions, width) = hidden.dim();
    if batch != lengths.len() {
        return Err(anyhow!(
            "hidden state has {batch} rows for {} sequences",
            lengths.len()
        ));
    }
    let mut pooled = Array2::zeros((batch, width));
    for (row, &len) in lengths.iter().enumerate() {
        if len == 0 || len + 1 >= positions {
            return Err(anyhow!(
                "sequence of length {len} does not fit {positions} positions"
            ));
        }
        let residues = hidden.slice(s![row, 1..=len, ..]);
        if let Some(mean) = residues.mean_axis(ndarray::Axis(0)) {
            pooled.row_mut(row).assign(&mean);
        }
    }
    Ok(pooled)
}

/// OnnxEmbedder
///
/// [`SequenceEmbedder`] backed by an ONNX Runtime session.
pub struct OnnxEmbedder {
    session: Session,
    tokenizer: Tokenizer,
    specials: SpecialTokens,
    output: String,
}

impl OnnxEmbedder {
    pub fn load(source: &ModelSource, base_dir: &Path, output: &str, cpu: bool) -> Result<Self> {
        let (model, tokenizer) = source.resolve(base_dir)?;
        let tokenizer = Tokenizer::from_file(&tokenizer).map_err(anyhow::Error::msg)?;
        let specials = SpecialTokens::from_tokenizer(&tokenizer)?;

        let mut environment = ort::init().with_name("tpscan-embedder");
        if !cpu {
            environment =
                environment.with_execution_providers([CUDAExecutionProvider::default().build()]);
        }
        environment.commit()?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level1)?
            .with_intra_threads(1)?
            .commit_from_file(&model)
            .with_context(|| format!("Failed to load ONNX model {}", model.display()))?;
        if !session.outputs.iter().any(|o| o.name == output) {
            let names: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
            return Err(anyhow!(
                "model {} has no output `{output}` (outputs: {names:?})",
                model.display()
            ));
        }
        info!(model = %model.display(), output, "loaded embedder");
        Ok(Self {
            session,
            tokenizer,
            specials,
            output: output.to_string(),
        })
    }

    fn tokenize(&self, sequence: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(sequence, false)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        Ok(encoding.get_ids().to_vec())
    }
}

impl SequenceEmbedder for OnnxEmbedder {
    fn embed(&mut self, sequences: &[String]) -> Result<Array2<f32>> {
        let tokens = sequences
            .iter()
            .map(|s| self.tokenize(s))
            .collect::<Result<Vec<_>>>()?;
        let lengths: Vec<usize> = tokens.iter().map(Vec::len).collect();
        let (input_ids, attention_mask) = pad_batch(&tokens, self.specials);
        debug!(shape = ?input_ids.dim(), "running embedder");

        let outputs = self.session.run(
            ort::inputs!["input_ids" => input_ids, "attention_mask" => attention_mask]?,
        )?;
        let hidden = outputs[self.output.as_str()]
            .try_extract_tensor::<f32>()?
            .into_dimensionality::<Ix3>()?;
        mean_pool(hidden, &lengths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    const SPECIALS: SpecialTokens = SpecialTokens {
        cls: 0,
        eos: 2,
        pad: 1,
    };

    #[test]
    fn test_pad_batch() {
        let (ids, mask) = pad_batch(&[vec![5, 6, 7], vec![9]], SPECIALS);
        assert_eq!(ids.dim(), (2, 5));
        assert_eq!(ids.row(0).to_vec(), vec![0, 5, 6, 7, 2]);
        assert_eq!(ids.row(1).to_vec(), vec![0, 9, 2, 1, 1]);
        assert_eq!(mask.row(0).to_vec(), vec![1, 1, 1, 1, 1]);
        assert_eq!(mask.row(1).to_vec(), vec![1, 1, 1, 0, 0]);
    }

    #[test]
    fn test_mean_pool_skips_special_positions() -> Result<()> {
        // value = position index, same for every hidden unit
        let hidden = Array3::from_shape_fn((2, 5, 3), |(_, pos, _)| pos as f32);
        let pooled = mean_pool(hidden.view(), &[3, 1])?;
        assert_eq!(pooled.dim(), (2, 3));
        assert_eq!(pooled.row(0).to_vec(), vec![2.0, 2.0, 2.0]);
        assert_eq!(pooled.row(1).to_vec(), vec![1.0, 1.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_mean_pool_rejects_bad_lengths() {
        let hidden = Array3::<f32>::zeros((1, 4, 2));
        assert!(mean_pool(hidden.view(), &[3]).is_err());
        assert!(mean_pool(hidden.view(), &[0]).is_err());
        assert!(mean_pool(hidden.view(), &[1, 1]).is_err());
    }

    #[test]
    fn test_model_source_json() {
        let source: ModelSource =
            serde_json::from_str(r#"{"source": "hugging_face", "repo": "zcpbx/esm2-t6-8m-UR50D-onnx"}"#)
                .unwrap();
        assert_eq!(
            source,
            ModelSource::HuggingFace {
                repo: "zcpbx/esm2-t6-8m-UR50D-onnx".to_string(),
                revision: "main".to_string()
            }
        );
        let source: ModelSource =
            serde_json::from_str(r#"{"source": "local", "path": "esm2"}"#).unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(source.resolve(dir.path()).is_err());
    }
}
