//! Interfaces to the services the pipeline depends on but does not implement.

use crate::domain::{DomainComparison, DomainDetections};
use crate::error::ScreenError;
use crate::structure::Structure;
use std::time::Duration;
use tracing::warn;

/// Version of the typed record files exchanged with the detection and alignment tools.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

/// Extracts the chain sequences (one-letter codes) of a structure file.
pub trait SequenceReader {
    fn chain_sequences(&self, structure: &Structure) -> anyhow::Result<Vec<String>>;
}

/// Finds the structural domains of a set of structures.
pub trait DomainDetector {
    fn detect(&self, structures: &[Structure]) -> Result<DomainDetections, ScreenError>;
}

/// Scores detected domains against the catalog of known domains.
pub trait DomainAligner {
    fn align(&self, detections: &DomainDetections) -> Result<DomainComparison, ScreenError>;
}

/// How often and how long a collaborator call may be attempted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Passed to every attempt; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            timeout: None,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, timeout: Option<Duration>) -> Self {
        Self {
            attempts: attempts.max(1),
            timeout,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// The last error is surfaced as [`ScreenError::Collaborator`].
    pub fn run<T>(
        &self,
        collaborator: &'static str,
        mut op: impl FnMut(Option<Duration>) -> anyhow::Result<T>,
    ) -> Result<T, ScreenError> {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(self.timeout) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!(collaborator, attempt, error = %format!("{e:#}"), "collaborator call failed, retrying");
                    std::thread::sleep(self.backoff);
                }
                Err(e) => {
                    return Err(ScreenError::Collaborator {
                        collaborator,
                        attempts: attempt,
                        message: format!("{e:#}"),
                    })
                }
            }
        }
    }
}
