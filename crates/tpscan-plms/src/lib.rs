//! tpscan-plms
//!
//! Model backends for the screening lanes: an ONNX protein language model used as the
//! sequence embedder and candle-backed logistic heads used as ensemble members.
//!
//! A lane directory holds an `ensemble.json` manifest naming the embedder and the members:
//!
//! ```text
//! fallback/
//!   ensemble.json          {"schema_version": 1, "embedder": {...}, "members": ["fold-0", ...]}
//!   fold-0.json            classifier spec
//!   fold-0.safetensors     `weight` [classes, features], `bias` [classes]
//! ```
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{Device, Result};
use tpscan_core::Lane;
use tracing::info;

mod classifier;
mod embedder;
mod manifest;

pub use classifier::LogisticClassifier;
pub use embedder::{mean_pool, ModelSource, OnnxEmbedder, SpecialTokens, DEFAULT_OUTPUT};
pub use manifest::{load_ensemble, load_lane, EnsembleManifest, MANIFEST_FILE};

/// Device for the classifiers of `lane`.
pub fn device(cpu: bool, lane: Lane) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else if cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            info!(%lane, "Running on CPU, to run on GPU(metal), build with `--features metal`");
        }
        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        {
            info!(%lane, "Running on CPU, to run on GPU, build with `--features cuda`");
        }
        Ok(Device::Cpu)
    }
}
