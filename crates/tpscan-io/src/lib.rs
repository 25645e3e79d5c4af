//! tpscan-io
//!
//! File-system and external-tool glue around the screening core:
//!
//! * structure discovery restricted to a candidate list ([`discover_structures`])
//! * chain sequence extraction from PDB / mmCIF files ([`PdbtbxReader`])
//! * typed record files exchanged with the domain tools ([`DetectionRecord`], [`ComparisonRecord`])
//! * the external detector and the Foldseek aligner ([`CommandDetector`], [`FoldseekAligner`])
//! * aggregation of per-protein results into one CSV ([`gather_detections`])
mod command;
mod discovery;
mod foldseek;
mod gather;
mod records;
mod sequence;

pub use command::{run_with_timeout, CommandDetector, DetectorCommand};
pub use discovery::{discover_structures, normalize_id, CandidateIds, REFERENCE_STRUCTURES};
pub use foldseek::{parse_alignments, FoldseekAligner, ScoreColumn, FOLDSEEK_COLUMNS};
pub use gather::gather_detections;
pub use records::{ComparisonRecord, DetectionRecord, RecordAligner, RecordDetector};
pub use sequence::{aa3to1, seqres_chains, PdbtbxReader};
