//! tpscan-test-data
//!
//! Test files embedded in the crate for use in testing.
//!
//! The test files are represented as `TestFile` objects which package the raw data and
//! create temporary files for programs to operate on.
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile};

#[derive(Debug)]
/// Test File
///
/// Example usage:
///
/// ```ignore
/// // returns (filepath, _tempfile_handle).
/// // _handle ensures the tempfile remains in scope
/// use tpscan_test_data::TestFile;
/// let (prot_file, _temp) = TestFile::tps_dimer().create_temp().unwrap();
/// ```
pub struct TestFile {
    filebinary: &'static [u8],
    name: &'static str,
    suffix: &'static str,
}

impl TestFile {
    /// Homodimer, chain A and B both `MKTAYIAKQR`, plus a water.
    pub fn tps_dimer() -> Self {
        Self {
            filebinary: include_bytes!("../data/structures/tps_dimer.pdb"),
            name: "tps_dimer",
            suffix: "pdb",
        }
    }
    /// Two distinct chains: `MSTEQ` and `GGHW`.
    pub fn heterodimer() -> Self {
        Self {
            filebinary: include_bytes!("../data/structures/heterodimer.pdb"),
            name: "heterodimer",
            suffix: "pdb",
        }
    }
    /// HETATM records only.
    pub fn waters_only() -> Self {
        Self {
            filebinary: include_bytes!("../data/structures/waters_only.pdb"),
            name: "waters_only",
            suffix: "pdb",
        }
    }
    /// SEQRES `MKTAYIA`; residues 3-5 have no coordinates.
    pub fn seqres_gap() -> Self {
        Self {
            filebinary: include_bytes!("../data/structures/seqres_gap.pdb"),
            name: "seqres_gap",
            suffix: "pdb",
        }
    }
    /// mmCIF monomer, `GSHMLE`.
    pub fn monomer_cif() -> Self {
        Self {
            filebinary: include_bytes!("../data/structures/monomer.cif"),
            name: "monomer",
            suffix: "cif",
        }
    }
    /// Detection record for `tps_dimer` and `monomer`.
    pub fn detections() -> Self {
        Self {
            filebinary: include_bytes!("../data/records/detections.json"),
            name: "detections",
            suffix: "json",
        }
    }
    /// Comparison record matching [`TestFile::detections`].
    pub fn comparisons() -> Self {
        Self {
            filebinary: include_bytes!("../data/records/comparisons.json"),
            name: "comparisons",
            suffix: "json",
        }
    }
    /// Foldseek `easy-search` output, 16 columns, no header.
    pub fn foldseek_alignments() -> Self {
        Self {
            filebinary: include_bytes!("../data/foldseek/alignments.tsv"),
            name: "alignments",
            suffix: "tsv",
        }
    }
    /// Candidate list with an `ID` column.
    pub fn candidates() -> Self {
        Self {
            filebinary: include_bytes!("../data/candidates.csv"),
            name: "candidates",
            suffix: "csv",
        }
    }

    pub fn create_temp(&self) -> std::io::Result<(String, NamedTempFile)> {
        let temp = Builder::new()
            .suffix(&format!(".{}", self.suffix))
            .tempfile()?;

        fs::write(&temp, self.filebinary)?;
        let path = temp.path().to_string_lossy().into_owned();

        Ok((path, temp))
    }

    /// Write the file into `dir` under its fixture name, e.g. `tps_dimer.pdb`.
    ///
    /// Structure ids are file stems, so tests that depend on ids use this instead of
    /// [`TestFile::create_temp`].
    pub fn write_to(&self, dir: impl AsRef<Path>) -> std::io::Result<PathBuf> {
        let path = dir.as_ref().join(format!("{}.{}", self.name, self.suffix));
        fs::write(&path, self.filebinary)?;
        Ok(path)
    }
}
