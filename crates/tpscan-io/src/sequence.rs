use anyhow::{anyhow, Context, Result};
use pdbtbx::PDB;
use tpscan_core::{SequenceReader, Structure, StructureFormat};

#[rustfmt::skip]
pub fn aa3to1(aa: &str) -> char {
    match aa {
        "ALA" => 'A', "CYS" => 'C', "ASP" => 'D',
        "GLU" => 'E', "PHE" => 'F', "GLY" => 'G',
        "HIS" => 'H', "ILE" => 'I', "LYS" => 'K',
        "LEU" => 'L', "MET" => 'M', "ASN" => 'N',
        "PRO" => 'P', "GLN" => 'Q', "ARG" => 'R',
        "SER" => 'S', "THR" => 'T', "VAL" => 'V',
        "TRP" => 'W', "TYR" => 'Y', _     => 'X',
    }
}

/// Chain sequences from the `SEQRES` records of a PDB file, in order of first appearance.
///
/// Empty when the file has no `SEQRES` records.
pub fn seqres_chains(content: &str) -> Vec<String> {
    let mut chains: Vec<(&str, String)> = Vec::new();
    for line in content.lines().filter(|l| l.starts_with("SEQRES")) {
        let chain_id = line.get(11..12).unwrap_or_default();
        let residues = line.get(19..).unwrap_or_default().split_whitespace().map(aa3to1);
        match chains.iter_mut().find(|(id, _)| *id == chain_id) {
            Some((_, sequence)) => sequence.extend(residues),
            None => chains.push((chain_id, residues.collect())),
        }
    }
    chains.into_iter().map(|(_, sequence)| sequence).collect()
}

/// Reads chain sequences of a structure.
///
/// PDB files with `SEQRES` records use the deposited sequence, so residues without
/// coordinates are kept. Otherwise, and for mmCIF files, the sequence is built from the
/// residues `pdbtbx` resolves; residues made only of hetero atoms (waters, ligands) are not
/// part of a chain's sequence.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdbtbxReader;

impl PdbtbxReader {
    fn chains(pdb: &PDB) -> Vec<String> {
        pdb.chains()
            .map(|chain| {
                chain
                    .residues()
                    .filter(|residue| residue.atoms().any(|atom| !atom.hetero()))
                    .map(|residue| aa3to1(residue.name().unwrap_or_default()))
                    .collect::<String>()
            })
            .collect()
    }
}

impl SequenceReader for PdbtbxReader {
    fn chain_sequences(&self, structure: &Structure) -> Result<Vec<String>> {
        if structure.format == StructureFormat::Pdb {
            let content = std::fs::read_to_string(&structure.path)
                .with_context(|| format!("Failed to read {}", structure.path.display()))?;
            let chains = seqres_chains(&content);
            if !chains.is_empty() {
                return Ok(chains);
            }
        }
        let path = structure
            .path
            .to_str()
            .ok_or_else(|| anyhow!("Non UTF-8 path {}", structure.path.display()))?;
        let (pdb, _warnings) = pdbtbx::open(path).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow!("Failed to parse {}: {}", path, messages.join("; "))
        })?;
        Ok(Self::chains(&pdb))
    }
}
