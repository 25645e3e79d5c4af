use std::path::{Path, PathBuf};
use strum::{Display, EnumIter, EnumString};

/// The two structure file formats accepted as input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StructureFormat {
    Pdb,
    Cif,
}

impl StructureFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

/// A structure file to be screened. The identifier is the file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    pub id: String,
    pub path: PathBuf,
    pub format: StructureFormat,
}

impl Structure {
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let format = StructureFormat::from_path(&path)?;
        let id = path.file_stem()?.to_str()?.to_string();
        Some(Self { id, path, format })
    }
}
