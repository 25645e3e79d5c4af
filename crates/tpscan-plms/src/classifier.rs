use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use ndarray::{Array2, ArrayView2};
use std::path::Path;
use tpscan_core::{ClassifierError, ClassifierSpec, ProbabilisticClassifier};

fn inference(e: candle_core::Error) -> ClassifierError {
    ClassifierError::Inference(e.to_string())
}

/// LogisticClassifier
///
/// One-vs-rest logistic heads: `sigmoid(x W^T + b)`, one column per class of its [`ClassifierSpec`].
pub struct LogisticClassifier {
    spec: ClassifierSpec,
    /// `W^T`, [features, classes].
    weight_t: Tensor,
    /// [1, classes].
    bias: Tensor,
    device: Device,
}

impl LogisticClassifier {
    /// Load `weight` [classes, features] and `bias` [classes] from a safetensors file.
    pub fn load(spec: ClassifierSpec, weights: &Path, device: &Device) -> Result<Self> {
        let mut tensors = candle_core::safetensors::load(weights, device)
            .with_context(|| format!("Failed to load weights {}", weights.display()))?;
        let weight = tensors
            .remove("weight")
            .ok_or_else(|| anyhow!("{}: missing `weight`", weights.display()))?;
        let bias = tensors
            .remove("bias")
            .ok_or_else(|| anyhow!("{}: missing `bias`", weights.display()))?;
        Self::new(spec, weight, bias)
    }

    pub fn new(spec: ClassifierSpec, weight: Tensor, bias: Tensor) -> Result<Self> {
        let classes = spec.classes.len();
        let (rows, _features) = weight.dims2()?;
        if rows != classes {
            return Err(anyhow!(
                "classifier `{}` declares {} classes but its weight has {} rows",
                spec.name,
                classes,
                rows
            ));
        }
        if bias.dims1()? != classes {
            return Err(anyhow!(
                "classifier `{}` bias has {} entries for {} classes",
                spec.name,
                bias.dims1()?,
                classes
            ));
        }
        let device = weight.device().clone();
        let weight_t = weight.to_dtype(DType::F32)?.t()?.contiguous()?;
        let bias = bias.to_dtype(DType::F32)?.unsqueeze(0)?;
        Ok(Self {
            spec,
            weight_t,
            bias,
            device,
        })
    }

    /// Number of input features the weights expect.
    pub fn input_width(&self) -> usize {
        self.weight_t.dims()[0]
    }
}

impl ProbabilisticClassifier for LogisticClassifier {
    fn spec(&self) -> &ClassifierSpec {
        &self.spec
    }

    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>, ClassifierError> {
        let (rows, width) = features.dim();
        if width != self.input_width() {
            return Err(ClassifierError::FeatureWidth {
                expected: self.input_width(),
                found: width,
            });
        }
        let data: Vec<f32> = features.iter().copied().collect();
        let x = Tensor::from_vec(data, (rows, width), &self.device).map_err(inference)?;
        let logits = x
            .matmul(&self.weight_t)
            .and_then(|l| l.broadcast_add(&self.bias))
            .map_err(inference)?;
        let proba = candle_nn::ops::sigmoid(&logits)
            .and_then(|p| p.flatten_all())
            .and_then(|p| p.to_vec1::<f32>())
            .map_err(inference)?;
        Array2::from_shape_vec((rows, self.spec.classes.len()), proba)
            .map_err(|e| ClassifierError::Inference(e.to_string()))
    }
}
