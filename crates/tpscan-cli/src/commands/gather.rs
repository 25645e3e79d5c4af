use anyhow::Result;
use std::path::PathBuf;
use tpscan_io::gather_detections;

pub fn execute(
    screening_results_root: PathBuf,
    output_path: PathBuf,
    delete_individual_files: bool,
) -> Result<()> {
    gather_detections(&screening_results_root, &output_path, delete_individual_files)?;
    Ok(())
}
