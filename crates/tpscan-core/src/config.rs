use crate::error::ScreenError;
use bon::Builder;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Parameters of a screening run.
///
/// ```
/// use tpscan_core::ScreenConfig;
///
/// let config = ScreenConfig::builder()
///     .detection_threshold(0.5)
///     .plm_batch_size(8)
///     .build()
///     .validated()
///     .unwrap();
/// assert_eq!(config.plm_max_seq_len, 1022);
/// ```
#[derive(Debug, Clone, PartialEq, Builder, Validate, Serialize, Deserialize)]
pub struct ScreenConfig {
    /// Minimum averaged probability reported as a detection.
    #[builder(default = 0.3)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub detection_threshold: f32,

    /// Also report proteins whose precursor-substrate probability meets the threshold.
    #[builder(default = false)]
    pub detect_precursor_synthases: bool,

    /// Sequences per embedding call.
    #[builder(default = 4)]
    #[validate(range(min = 1))]
    pub plm_batch_size: usize,

    /// Longest sequence passed to the embedder, special tokens included.
    #[builder(default = 1022)]
    #[validate(range(min = 3))]
    pub plm_max_seq_len: usize,

    /// Embedding batches per classification window.
    #[builder(default = 4096)]
    #[validate(range(min = 1))]
    pub clf_batch_size: usize,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ScreenConfig {
    pub fn validated(self) -> Result<Self, ScreenError> {
        self.validate()
            .map_err(|e| ScreenError::Config(e.to_string()))?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScreenConfig::default();
        assert_eq!(config.detection_threshold, 0.3);
        assert!(!config.detect_precursor_synthases);
        assert_eq!(config.plm_batch_size, 4);
        assert_eq!(config.plm_max_seq_len, 1022);
        assert_eq!(config.clf_batch_size, 4096);
        assert!(config.validated().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        let config = ScreenConfig::builder().detection_threshold(1.5).build();
        assert!(matches!(config.validated(), Err(ScreenError::Config(_))));

        let config = ScreenConfig::builder().plm_batch_size(0).build();
        assert!(config.validated().is_err());

        let config = ScreenConfig::builder().plm_max_seq_len(2).build();
        assert!(config.validated().is_err());
    }
}
