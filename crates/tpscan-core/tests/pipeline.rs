use ndarray::{Array2, ArrayView2, Axis};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tempfile::tempdir;
use tpscan_core::{
    ClassifierError, ClassifierSpec, DetectedDomain, DomainComparison, DomainDetections,
    DomainType, EmbeddingStage, EnsembleStage, Lane, LaneModels, ProbabilisticClassifier,
    ResultSink, ScreenConfig, ScreeningPipeline, SequenceEmbedder, SequenceReader, Structure,
};

/// Sequences by structure id; unknown ids have no chains.
struct MapReader(HashMap<String, Vec<String>>);

impl SequenceReader for MapReader {
    fn chain_sequences(&self, structure: &Structure) -> anyhow::Result<Vec<String>> {
        Ok(self.0.get(&structure.id).cloned().unwrap_or_default())
    }
}

/// Embeds a sequence as `len / 100` and records batch sizes.
struct LengthEmbedder {
    batches: Rc<RefCell<Vec<usize>>>,
}

impl SequenceEmbedder for LengthEmbedder {
    fn embed(&mut self, sequences: &[String]) -> anyhow::Result<Array2<f32>> {
        self.batches.borrow_mut().push(sequences.len());
        Ok(Array2::from_shape_fn((sequences.len(), 1), |(i, _)| {
            sequences[i].len() as f32 / 100.0
        }))
    }
}

/// `isTPS` is `1 - last input column`, i.e. the similarity behind the only domain feature,
/// or the embedding itself when there are no domain features. Records input widths.
struct Echo {
    spec: ClassifierSpec,
    invert: bool,
    widths: Rc<RefCell<Vec<usize>>>,
}

impl ProbabilisticClassifier for Echo {
    fn spec(&self) -> &ClassifierSpec {
        &self.spec
    }

    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>, ClassifierError> {
        self.widths.borrow_mut().push(features.ncols());
        let last = features.ncols() - 1;
        let column = features.select(Axis(1), &[last]);
        Ok(if self.invert {
            column.mapv(|v| 1.0 - v)
        } else {
            column
        })
    }
}

struct Harness {
    domain_batches: Rc<RefCell<Vec<usize>>>,
    fallback_batches: Rc<RefCell<Vec<usize>>>,
    domain_widths: Rc<RefCell<Vec<usize>>>,
    fallback_widths: Rc<RefCell<Vec<usize>>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            domain_batches: Rc::default(),
            fallback_batches: Rc::default(),
            domain_widths: Rc::default(),
            fallback_widths: Rc::default(),
        }
    }

    fn lanes(&self) -> (LaneModels, LaneModels) {
        self.lanes_with(&[r#"{"schema_version": 1, "name": "domain-0", "classes": ["isTPS"],
                "domain_layout": {"alpha1": [{"known_module_id": "k_alpha", "index": 0}]}}"#])
    }

    /// Domain-lane members built from the given specs, applied in order.
    fn lanes_with(&self, domain_specs: &[&str]) -> (LaneModels, LaneModels) {
        let members: Vec<Box<dyn ProbabilisticClassifier>> = domain_specs
            .iter()
            .map(|json| {
                Box::new(Echo {
                    spec: ClassifierSpec::from_json_str(json).unwrap(),
                    invert: true,
                    widths: self.domain_widths.clone(),
                }) as Box<dyn ProbabilisticClassifier>
            })
            .collect();
        let fallback_spec = ClassifierSpec::from_json_str(
            r#"{"schema_version": 1, "name": "plm-0", "classes": ["isTPS", "Unknown"]}"#,
        )
        .unwrap();
        let domain = LaneModels::new(
            EmbeddingStage::new(
                Box::new(LengthEmbedder {
                    batches: self.domain_batches.clone(),
                }),
                1022,
            ),
            EnsembleStage::new(Lane::DomainFeatured, members).unwrap(),
        );
        let fallback = LaneModels::new(
            EmbeddingStage::new(
                Box::new(LengthEmbedder {
                    batches: self.fallback_batches.clone(),
                }),
                1022,
            ),
            EnsembleStage::new(
                Lane::Fallback,
                vec![Box::new(TwoColumn(Echo {
                    spec: fallback_spec,
                    invert: false,
                    widths: self.fallback_widths.clone(),
                }))],
            )
            .unwrap(),
        );
        (domain, fallback)
    }
}

/// Pads [`Echo`] output with an `Unknown` column of ones.
struct TwoColumn(Echo);

impl ProbabilisticClassifier for TwoColumn {
    fn spec(&self) -> &ClassifierSpec {
        self.0.spec()
    }

    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>, ClassifierError> {
        let tps = self.0.predict_proba(features)?;
        Ok(Array2::from_shape_fn((tps.nrows(), 2), |(i, j)| {
            if j == 0 {
                tps[[i, 0]]
            } else {
                1.0
            }
        }))
    }
}

fn structures(ids: &[&str]) -> Vec<Structure> {
    ids.iter()
        .map(|id| Structure::from_path(format!("structures/{id}.pdb")).unwrap())
        .collect()
}

fn alpha_hit(
    detections: &mut DomainDetections,
    comparison: &mut DomainComparison,
    id: &str,
    similarity: f32,
) {
    let module_id = format!("{id}_alpha_0");
    detections.insert(
        id.to_string(),
        vec![DetectedDomain {
            domain_type: DomainType::Alpha,
            module_id: module_id.clone(),
        }],
    );
    comparison.insert(
        id.to_string(),
        HashMap::from([(
            module_id,
            HashMap::from([("k_alpha".to_string(), similarity)]),
        )]),
    );
}

/// Register `(domain type, known module, similarity)` hits for one structure, in order.
fn domain_hits(
    detections: &mut DomainDetections,
    comparison: &mut DomainComparison,
    id: &str,
    hits: &[(DomainType, &str, f32)],
) {
    let mut detected = Vec::new();
    let mut modules = HashMap::new();
    for (i, (kind, known, similarity)) in hits.iter().enumerate() {
        let module_id = format!("{id}_{i}");
        detected.push(DetectedDomain {
            domain_type: *kind,
            module_id: module_id.clone(),
        });
        modules.insert(
            module_id,
            HashMap::from([(known.to_string(), *similarity)]),
        );
    }
    detections.insert(id.to_string(), detected);
    comparison.insert(id.to_string(), modules);
}

fn written_ids(dir: &std::path::Path) -> Vec<String> {
    let mut ids: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            entry
                .unwrap()
                .path()
                .file_stem()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    ids.sort();
    ids
}

#[test]
fn test_five_structure_scenario() {
    let harness = Harness::new();
    let (domain, fallback) = harness.lanes();
    // fallback probabilities are len / 100: F1 0.1, F2 0.3 (equal to the threshold), F3 0.5
    let reader = MapReader(HashMap::from([
        ("D1".to_string(), vec!["M".repeat(10)]),
        ("D2".to_string(), vec!["M".repeat(20)]),
        ("F1".to_string(), vec!["M".repeat(10)]),
        ("F2".to_string(), vec!["M".repeat(30)]),
        ("F3".to_string(), vec!["M".repeat(50)]),
    ]));
    let mut detections = DomainDetections::new();
    let mut comparison = DomainComparison::new();
    alpha_hit(&mut detections, &mut comparison, "D1", 0.8);
    alpha_hit(&mut detections, &mut comparison, "D2", 0.8);

    let mut pipeline =
        ScreeningPipeline::new(ScreenConfig::default(), &reader, domain, fallback).unwrap();
    let all = structures(&["D1", "D2", "F1", "F2", "F3"]);

    let partition = pipeline.partition(&all, &detections, &comparison);
    assert_eq!(partition.domain_featured.len(), 2);
    assert_eq!(partition.fallback.len(), 3);
    for (_, features) in &partition.domain_featured {
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].len(), 1);
    }

    let dir = tempdir().unwrap();
    let mut sink = ResultSink::create(dir.path(), 0.3, false).unwrap();
    let summary = pipeline
        .run(&all, &detections, &comparison, &mut sink)
        .unwrap();

    let domain_report = summary.lane(Lane::DomainFeatured).unwrap();
    let fallback_report = summary.lane(Lane::Fallback).unwrap();
    assert_eq!(domain_report.classified, 2);
    assert_eq!(fallback_report.classified, 3);
    assert_eq!(summary.rerouted, 0);
    assert_eq!(summary.positives(), 4);
    assert_eq!(written_ids(dir.path()), vec!["D1", "D2", "F2", "F3"]);

    // one embedding column plus one domain feature in the domain lane only
    assert!(harness.domain_widths.borrow().iter().all(|&w| w == 2));
    assert!(harness.fallback_widths.borrow().iter().all(|&w| w == 1));
}

#[test]
fn test_rerouted_proteins_never_receive_domain_features() {
    let harness = Harness::new();
    let (domain, fallback) = harness.lanes();
    let reader = MapReader(HashMap::from([
        ("strong".to_string(), vec!["M".repeat(40)]),
        ("boundary".to_string(), vec!["M".repeat(40)]),
        ("weak".to_string(), vec!["M".repeat(40)]),
    ]));
    let mut detections = DomainDetections::new();
    let mut comparison = DomainComparison::new();
    alpha_hit(&mut detections, &mut comparison, "strong", 0.9);
    alpha_hit(&mut detections, &mut comparison, "boundary", 0.4);
    alpha_hit(&mut detections, &mut comparison, "weak", 0.39);

    let mut pipeline =
        ScreeningPipeline::new(ScreenConfig::default(), &reader, domain, fallback).unwrap();
    let all = structures(&["strong", "boundary", "weak"]);
    let partition = pipeline.partition(&all, &detections, &comparison);
    let featured: Vec<&str> = partition
        .domain_featured
        .iter()
        .map(|(s, _)| s.id.as_str())
        .collect();
    assert_eq!(featured, vec!["strong", "boundary"]);
    assert_eq!(partition.rerouted, vec!["weak".to_string()]);

    let dir = tempdir().unwrap();
    let mut sink = ResultSink::create(dir.path(), 0.3, false).unwrap();
    let summary = pipeline
        .run(&all, &detections, &comparison, &mut sink)
        .unwrap();
    assert_eq!(summary.rerouted, 1);
    assert_eq!(summary.lane(Lane::Fallback).unwrap().classified, 1);
    assert_eq!(*harness.fallback_widths.borrow(), vec![1]);
}

#[test]
fn test_batch_boundaries_and_skips() {
    let harness = Harness::new();
    let (domain, fallback) = harness.lanes();
    let ids: Vec<String> = (0..12).map(|i| format!("P{i:02}")).collect();
    // P10 and P11 have no sequence and are skipped before embedding
    let reader = MapReader(
        ids.iter()
            .take(10)
            .map(|id| (id.clone(), vec!["MKT".to_string()]))
            .collect(),
    );
    let config = ScreenConfig::builder()
        .plm_batch_size(4)
        .clf_batch_size(8)
        .build();
    let mut pipeline = ScreeningPipeline::new(config, &reader, domain, fallback).unwrap();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let all = structures(&id_refs);

    let dir = tempdir().unwrap();
    let mut sink = ResultSink::create(dir.path(), 0.3, false).unwrap();
    let summary = pipeline
        .run(
            &all,
            &DomainDetections::new(),
            &DomainComparison::new(),
            &mut sink,
        )
        .unwrap();

    assert_eq!(*harness.fallback_batches.borrow(), vec![4, 4, 2]);
    assert!(harness.domain_batches.borrow().is_empty());
    let report = summary.lane(Lane::Fallback).unwrap();
    assert_eq!(report.submitted, 12);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.classified, 10);
    assert_eq!(report.embedding_batches, 3);
    // three embedding batches never fill a window of eight, so the lane end flushes it
    assert_eq!(report.classification_batches, 1);
    // every protein scores 0.03 and none is written
    assert_eq!(summary.positives(), 0);
}

#[test]
fn test_lane_mismatch_rejected() {
    let harness = Harness::new();
    let (domain, fallback) = harness.lanes();
    let reader = MapReader(HashMap::new());
    assert!(ScreeningPipeline::new(ScreenConfig::default(), &reader, fallback, domain).is_err());
}

#[test]
fn test_windows_count_embedding_batches() {
    let harness = Harness::new();
    let (domain, fallback) = harness.lanes();
    let ids: Vec<String> = (0..10).map(|i| format!("P{i:02}")).collect();
    let reader = MapReader(
        ids.iter()
            .map(|id| (id.clone(), vec!["MKT".to_string()]))
            .collect(),
    );
    let config = ScreenConfig::builder()
        .plm_batch_size(4)
        .clf_batch_size(2)
        .build();
    let mut pipeline = ScreeningPipeline::new(config, &reader, domain, fallback).unwrap();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    let dir = tempdir().unwrap();
    let mut sink = ResultSink::create(dir.path(), 0.3, false).unwrap();
    let summary = pipeline
        .run(
            &structures(&id_refs),
            &DomainDetections::new(),
            &DomainComparison::new(),
            &mut sink,
        )
        .unwrap();

    let report = summary.lane(Lane::Fallback).unwrap();
    assert_eq!(*harness.fallback_batches.borrow(), vec![4, 4, 2]);
    assert_eq!(report.classification_batches, 2);
    assert_eq!(report.classified, 10);
    // one call per window: 8 rows, then 2
    assert_eq!(harness.fallback_widths.borrow().len(), 2);
}

#[test]
fn test_one_weak_member_evicts_protein() {
    let harness = Harness::new();
    let (domain, fallback) = harness.lanes_with(&[
        r#"{"schema_version": 1, "name": "domain-0", "classes": ["isTPS"],
            "domain_layout": {"alpha1": [{"known_module_id": "k_alpha", "index": 0}]}}"#,
        r#"{"schema_version": 1, "name": "domain-1", "classes": ["isTPS"],
            "domain_layout": {"beta": [{"known_module_id": "k_beta", "index": 0}]}}"#,
    ]);
    let reader = MapReader(HashMap::from([
        ("both".to_string(), vec!["M".repeat(40)]),
        ("half".to_string(), vec!["M".repeat(40)]),
        ("repeat".to_string(), vec!["M".repeat(40)]),
    ]));
    let mut detections = DomainDetections::new();
    let mut comparison = DomainComparison::new();
    domain_hits(
        &mut detections,
        &mut comparison,
        "both",
        &[(DomainType::Alpha, "k_alpha", 0.9), (DomainType::Beta, "k_beta", 0.8)],
    );
    // domain-0 sees strong evidence, domain-1 does not
    domain_hits(
        &mut detections,
        &mut comparison,
        "half",
        &[(DomainType::Alpha, "k_alpha", 0.9), (DomainType::Beta, "k_beta", 0.2)],
    );
    // the second beta domain replaces the first in domain-1's only slot
    domain_hits(
        &mut detections,
        &mut comparison,
        "repeat",
        &[
            (DomainType::Alpha, "k_alpha", 0.9),
            (DomainType::Beta, "k_beta", 0.9),
            (DomainType::Beta, "k_beta", 0.1),
        ],
    );

    let mut pipeline =
        ScreeningPipeline::new(ScreenConfig::default(), &reader, domain, fallback).unwrap();
    let all = structures(&["both", "half", "repeat"]);
    let partition = pipeline.partition(&all, &detections, &comparison);
    let featured: Vec<&str> = partition
        .domain_featured
        .iter()
        .map(|(s, _)| s.id.as_str())
        .collect();
    assert_eq!(featured, vec!["both"]);
    assert_eq!(
        partition.rerouted,
        vec!["half".to_string(), "repeat".to_string()]
    );

    let dir = tempdir().unwrap();
    let mut sink = ResultSink::create(dir.path(), 0.3, false).unwrap();
    let summary = pipeline
        .run(&all, &detections, &comparison, &mut sink)
        .unwrap();
    assert_eq!(summary.rerouted, 2);
    assert_eq!(summary.lane(Lane::DomainFeatured).unwrap().classified, 1);
    assert_eq!(summary.lane(Lane::Fallback).unwrap().classified, 2);
    // both members saw "both" with its feature; the fallback lane saw embeddings only
    assert_eq!(*harness.domain_widths.borrow(), vec![2, 2]);
    assert_eq!(*harness.fallback_widths.borrow(), vec![1]);
    // "both" averages 0.9 and 0.8, the rerouted ones score 0.4 from their embedding
    assert_eq!(written_ids(dir.path()), vec!["both", "half", "repeat"]);
}
