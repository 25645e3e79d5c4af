use super::commands;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tpscan_io::ScoreColumn;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Screen a directory of structures for terpene synthases.
    Screen(ScreenArgs),
    /// Fold a directory of per-protein result files into one CSV.
    Gather {
        #[arg(long)]
        screening_results_root: PathBuf,
        #[arg(long)]
        output_path: PathBuf,
        #[arg(long)]
        delete_individual_files: bool,
    },
}

#[derive(Args, Debug)]
pub struct ScreenArgs {
    // Inputs
    #[arg(long, required = true)]
    pub structures_dir: PathBuf,

    #[arg(long, required = true)]
    pub candidates_csv: PathBuf,

    #[arg(long, default_value = "ID")]
    pub id_column: String,

    #[arg(long, required = true)]
    pub output_csv: PathBuf,

    // Screening
    #[arg(long, default_value_t = 0.3)]
    pub detection_threshold: f32,

    #[arg(long)]
    pub detect_precursor_synthases: bool,

    #[arg(long, default_value_t = 4)]
    pub plm_batch_size: usize,

    #[arg(long, default_value_t = 1022)]
    pub plm_max_seq_len: usize,

    /// Embedding batches per classification window.
    #[arg(long, default_value_t = 4096)]
    pub clf_batch_size: usize,

    // Models
    /// Lane directory of the domain-featured ensemble.
    #[arg(long, required = true)]
    pub primary_models: PathBuf,

    /// Lane directory of the embedding-only ensemble.
    #[arg(long, required = true)]
    pub fallback_models: PathBuf,

    #[arg(long)]
    pub cpu: bool,

    // Domain detection
    /// Precomputed detection record; replaces the detector command.
    #[arg(long, conflicts_with = "detector_command")]
    pub detections: Option<PathBuf>,

    #[arg(long)]
    pub detector_command: Option<PathBuf>,

    /// Extra leading arguments of the detector command.
    #[arg(long = "detector-arg", allow_hyphen_values = true)]
    pub detector_args: Vec<String>,

    #[arg(long, default_value_t = 16)]
    pub n_jobs: usize,

    #[arg(long)]
    pub bfactor_confidence: bool,

    // Domain comparison
    /// Precomputed comparison record; replaces Foldseek.
    #[arg(long, conflicts_with = "known_domains_dir")]
    pub comparisons: Option<PathBuf>,

    #[arg(long, default_value = "foldseek")]
    pub foldseek: PathBuf,

    #[arg(long)]
    pub known_domains_dir: Option<PathBuf>,

    /// Structures of the detected domains; defaults to the detector's output.
    #[arg(long)]
    pub detected_domains_dir: Option<PathBuf>,

    #[arg(long, default_value_t = ScoreColumn::Alntmscore)]
    pub foldseek_score: ScoreColumn,

    // Collaborators
    #[arg(long)]
    pub collaborator_timeout_secs: Option<u64>,

    /// Attempts per external tool call.
    #[arg(long, default_value_t = 1)]
    pub collaborator_retries: u32,

    #[arg(long)]
    pub keep_individual_files: bool,
}

impl Cli {
    pub fn execute(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Screen(args) => commands::screen::execute(args),
            Commands::Gather {
                screening_results_root,
                output_path,
                delete_individual_files,
            } => commands::gather::execute(
                screening_results_root,
                output_path,
                delete_individual_files,
            ),
        }
    }
}
