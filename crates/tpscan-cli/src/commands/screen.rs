use crate::cli::ScreenArgs;
use anyhow::{bail, Context, Result};
use std::time::Duration;
use tpscan_core::{
    DomainAligner, DomainDetector, Lane, ResultSink, RetryPolicy, ScreenConfig, ScreeningPipeline,
};
use tpscan_io::{
    discover_structures, gather_detections, CandidateIds, CommandDetector, DetectorCommand,
    FoldseekAligner, PdbtbxReader, RecordAligner, RecordDetector,
};
use tpscan_plms::load_lane;
use tracing::info;

pub fn execute(args: ScreenArgs) -> Result<()> {
    let config = ScreenConfig::builder()
        .detection_threshold(args.detection_threshold)
        .detect_precursor_synthases(args.detect_precursor_synthases)
        .plm_batch_size(args.plm_batch_size)
        .plm_max_seq_len(args.plm_max_seq_len)
        .clf_batch_size(args.clf_batch_size)
        .build()
        .validated()?;
    let retry = RetryPolicy::new(
        args.collaborator_retries,
        args.collaborator_timeout_secs.map(Duration::from_secs),
    );

    let candidates = CandidateIds::from_csv(&args.candidates_csv, &args.id_column)?;
    let structures = discover_structures(&args.structures_dir, Some(&candidates))?;
    info!(
        candidates = candidates.len(),
        structures = structures.len(),
        "structures to screen"
    );

    let output_dir = match args.output_csv.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    std::fs::create_dir_all(&output_dir)?;
    // detector outputs, removed once the run ends
    let workspace = tempfile::Builder::new()
        .prefix("tpscan_domains_")
        .tempdir_in(&output_dir)?;
    let detected_domains_dir = args
        .detected_domains_dir
        .clone()
        .unwrap_or_else(|| workspace.path().join("detected_domains"));

    let detector: Box<dyn DomainDetector> = match (&args.detections, &args.detector_command) {
        (Some(record), _) => Box::new(RecordDetector::new(record)),
        (None, Some(program)) => Box::new(CommandDetector::new(
            DetectorCommand {
                program: program.clone(),
                args: args.detector_args.clone(),
                structures_dir: args.structures_dir.clone(),
                candidates_csv: args.candidates_csv.clone(),
                id_column: args.id_column.clone(),
                n_jobs: args.n_jobs,
                bfactor_confidence: args.bfactor_confidence,
                domains_output_dir: detected_domains_dir.clone(),
                detections_output: workspace.path().join("detections.json"),
            },
            retry.clone(),
        )),
        (None, None) => bail!("either --detections or --detector-command is required"),
    };
    let aligner: Box<dyn DomainAligner> = match (&args.comparisons, &args.known_domains_dir) {
        (Some(record), _) => Box::new(RecordAligner::new(record)),
        (None, Some(known)) => Box::new(FoldseekAligner {
            foldseek: args.foldseek.clone(),
            detected_domains_dir,
            known_domains_dir: known.clone(),
            work_dir: Some(workspace.path().to_path_buf()),
            score: args.foldseek_score,
            retry,
        }),
        (None, None) => bail!("either --comparisons or --known-domains-dir is required"),
    };

    let detections = detector.detect(&structures)?;
    let comparison = aligner.align(&detections)?;

    let domain_lane = load_lane(
        &args.primary_models,
        Lane::DomainFeatured,
        config.plm_max_seq_len,
        args.cpu,
    )
    .with_context(|| format!("Failed to load models from {}", args.primary_models.display()))?;
    let fallback_lane = load_lane(
        &args.fallback_models,
        Lane::Fallback,
        config.plm_max_seq_len,
        args.cpu,
    )
    .with_context(|| format!("Failed to load models from {}", args.fallback_models.display()))?;

    let results = tempfile::Builder::new()
        .prefix("detections_plm_")
        .tempdir_in(&output_dir)?;
    let mut sink = ResultSink::create(
        results.path(),
        config.detection_threshold,
        config.detect_precursor_synthases,
    )?;
    let reader = PdbtbxReader;
    let mut pipeline = ScreeningPipeline::new(config, &reader, domain_lane, fallback_lane)?;
    let summary = pipeline.run(&structures, &detections, &comparison, &mut sink)?;
    for lane in &summary.lanes {
        info!(
            lane = %lane.lane,
            submitted = lane.submitted,
            classified = lane.classified,
            skipped = lane.skipped,
            positives = lane.positives,
            "lane finished"
        );
    }
    info!(
        positives = summary.positives(),
        rerouted = summary.rerouted,
        "screening finished"
    );

    let rows = gather_detections(
        results.path(),
        &args.output_csv,
        !args.keep_individual_files,
    )?;
    if args.keep_individual_files {
        let kept = results.into_path();
        info!(dir = %kept.display(), "individual result files kept");
    }
    info!(rows, output = %args.output_csv.display(), "wrote detections");
    Ok(())
}
