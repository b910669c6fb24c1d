use crate::align::{AlignEngine, AlignerDriver};
use crate::alert::{AlertCode, AlertLog, AlertRegistry, AlertTarget};
use crate::classify::Classifier;
use crate::config::PipelineConfig;
use crate::coord::CoordMapper;
use crate::feature::{evaluate_model_features, CdsConfig};
use crate::model::{FeatureType, Model, ModelLibrary};
use crate::protein::{reconcile_all, ProteinAligner, ProteinQuery};
use crate::report::{PipelineReport, Reporter};
use crate::results::ResultsStore;
use crate::search::{classify_pass1, classify_pass2, SearchEngine, SearchOrchestrator};
use crate::sequence::Sequence;
use eyre::Report;
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// Drives every pipeline stage over one batch of input sequences, in the fixed order:
/// search → classify → align → map → build → reconcile → report.
pub struct Pipeline<'a> {
  search_engine: &'a dyn SearchEngine,
  align_engine: &'a dyn AlignEngine,
  protein_aligner: &'a dyn ProteinAligner,
  config: PipelineConfig,
  cds_config: CdsConfig,
}

impl<'a> Pipeline<'a> {
  pub fn new(
    search_engine: &'a dyn SearchEngine,
    align_engine: &'a dyn AlignEngine,
    protein_aligner: &'a dyn ProteinAligner,
    config: PipelineConfig,
    cds_config: CdsConfig,
  ) -> Result<Self, Report> {
    config.validate()?;
    Ok(Self {
      search_engine,
      align_engine,
      protein_aligner,
      config,
      cds_config,
    })
  }

  pub fn run(&self, sequences: &[Sequence], library: &ModelLibrary) -> Result<(ResultsStore, AlertLog, PipelineReport), Report> {
    let mut store = ResultsStore::new();
    let mut alert_log = AlertLog::new(AlertRegistry::new());
    let sequence_lengths: BTreeMap<String, usize> = sequences.iter().map(|s| (s.name.clone(), s.len())).collect();
    let sequence_names: Vec<String> = sequences.iter().map(|s| s.name.clone()).collect();

    info!("pass 1: classifying {} sequences against {} models", sequences.len(), library.models.len());
    let orchestrator = SearchOrchestrator::new(self.search_engine, self.config.parallelism);
    let pass1_hits = orchestrator.run_pass1(sequences, library)?;
    let mut classifications = classify_pass1(
      pass1_hits,
      &sequence_lengths,
      library,
      self.config.expected_group.as_deref(),
      self.config.expected_subgroup.as_deref(),
    );

    let mut by_top_model: BTreeMap<String, Vec<Sequence>> = BTreeMap::new();
    for sequence in sequences {
      if let Some(result) = classifications.get(&sequence.name) {
        if let Some(best) = &result.best_overall_pass1 {
          by_top_model.entry(best.model.clone()).or_default().push(sequence.clone());
        }
      }
    }

    info!("pass 2: refining {} model-assigned groups", by_top_model.len());
    let mut pass2_hits = Vec::new();
    for (model_name, group) in &by_top_model {
      let Some(model) = library.get(model_name) else { continue };
      pass2_hits.extend(orchestrator.run_pass2(group, model)?);
    }
    let pass2_records = classify_pass2(pass2_hits, &sequence_lengths)?;
    for (seq_name, record) in pass2_records {
      if let Some(result) = classifications.get_mut(&seq_name) {
        result.best_in_pass2 = Some(record);
      }
    }

    let classifier = Classifier::new(
      self.config.classification,
      self.config.expected_group.clone(),
      self.config.expected_subgroup.clone(),
    )?;
    for sequence in sequences {
      let classification = classifications.entry(sequence.name.clone()).or_default();
      classifier.classify_sequence(&sequence.name, classification, sequence.len(), &mut store, &mut alert_log)?;
    }

    let mut by_assigned_model: BTreeMap<String, Vec<Sequence>> = BTreeMap::new();
    for sequence in sequences {
      if alert_log.prevents_annotation(&sequence.name) {
        debug!("{}: skipped (prevents-annotation alert)", sequence.name);
        continue;
      }
      if let Some(model_name) = store.assigned_model(&sequence.name) {
        by_assigned_model.entry(model_name.to_owned()).or_default().push(sequence.clone());
      }
    }

    let aligner_driver = AlignerDriver::new(self.align_engine, self.config.alignment);
    let mapper = CoordMapper::new(self.config.low_pp_threshold);
    for (model_name, group) in &by_assigned_model {
      let Some(model) = library.get(model_name) else { continue };
      let alignments = aligner_driver.align_sequences(group, model, &mut alert_log)?;
      for alignment in &alignments {
        let seq_len = sequence_lengths.get(&alignment.seq_name).copied().unwrap_or(0);
        mapper.map_alignment(model, alignment, seq_len, &mut store, &mut alert_log)?;
      }
      for sequence in group {
        evaluate_model_features(model, sequence, &self.cds_config, &mut store, &mut alert_log)?;
      }

      let queries = build_protein_queries(model, group, &store);
      if !queries.is_empty() {
        if let Some(db_path) = &model.protein_db_path {
          let hits = self.protein_aligner.align(&queries, db_path)?;
          reconcile_all(&hits, model, &self.config.protein, &mut store, &mut alert_log)?;
        } else {
          warn!("model '{model_name}' has coding-regions but no protein database configured; skipping protein reconciliation");
        }
      }
    }

    for sequence in sequences {
      if alert_log.prevents_annotation(&sequence.name) {
        continue;
      }
      if store.assigned_model(&sequence.name).is_some() && !store.has_any_feature_result(&sequence.name) {
        let target = AlertTarget::Sequence {
          seq_name: sequence.name.clone(),
        };
        alert_log.add(AlertCode::ZeroFeaturesAnnotated, target, "no feature received a nucleotide or protein prediction")?;
      }
    }

    let report = Reporter::new().report(library, &sequence_names, &store, &alert_log)?;
    Ok((store, alert_log, report))
  }
}

fn build_protein_queries(model: &Model, sequences: &[Sequence], store: &ResultsStore) -> Vec<ProteinQuery> {
  let mut queries = Vec::new();
  for feature in &model.features {
    if feature.feature_type != FeatureType::CodingRegion || feature.is_duplicate() {
      continue;
    }
    for sequence in sequences {
      match crate::feature::assemble_feature(feature, sequence, store) {
        Some(assembled) => queries.push(ProteinQuery {
          seq_name: sequence.name.clone(),
          feature_idx: feature.index,
          bases: assembled.nucleotides,
          is_full_sequence_query: false,
        }),
        None => queries.push(ProteinQuery {
          seq_name: sequence.name.clone(),
          feature_idx: feature.index,
          bases: sequence.bases.clone(),
          is_full_sequence_query: true,
        }),
      }
    }
  }
  queries
}

#[cfg(test)]
mod pipeline_tests {
  use super::*;
  use crate::align::{AlignOutcome, AlignmentResult};
  use crate::model::{Feature, Segment};
  use crate::results::ProteinQueryRecord;
  use crate::search::SearchHit;
  use crate::sequence::Strand;
  use crate::utils::range::Range;
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use std::path::Path;

  fn single_cds_model(name: &str, length: usize, group: Option<&str>, subgroup: Option<&str>) -> Model {
    Model {
      name: name.to_owned(),
      length,
      group: group.map(str::to_owned),
      subgroup: subgroup.map(str::to_owned),
      protein_db_path: None,
      cm_file: None,
      features: vec![Feature {
        index: 0,
        feature_type: FeatureType::CodingRegion,
        type_index: 1,
        product: Some("polyprotein".to_owned()),
        gene: None,
        segments: vec![Segment {
          model_range: Range::from_one_based_inclusive(1, length),
          strand: Strand::Plus,
          map_to_feature_index: 0,
        }],
        parent_feature_idx: None,
        source_feature_idx: None,
        child_feature_indices: vec![],
      }],
    }
  }

  fn library_of(models: Vec<Model>) -> ModelLibrary {
    ModelLibrary {
      models: models.into_iter().map(|m| (m.name.clone(), m)).collect(),
    }
  }

  fn flush_alignment(seq_name: &str, bases: &[u8]) -> AlignmentResult {
    AlignmentResult {
      seq_name: seq_name.to_owned(),
      reference_columns: vec![true; bases.len()],
      aligned_bases: bases.iter().map(|&b| Some(b)).collect(),
      posterior_probs: vec![Some('*'); bases.len()],
      inserts: vec![],
    }
  }

  struct FakeSearch {
    model_name: String,
  }
  impl SearchEngine for FakeSearch {
    fn search_pass1(&self, sequences: &[Sequence], _library: &ModelLibrary) -> Result<Vec<SearchHit>, Report> {
      Ok(
        sequences
          .iter()
          .map(|s| SearchHit {
            seq_name: s.name.clone(),
            model_name: self.model_name.clone(),
            model_from: 1,
            model_to: s.len(),
            seq_from: 1,
            seq_to: s.len(),
            strand: Strand::Plus,
            bias: 0.0,
            score: 900.0,
            e_value: Some(1e-200),
          })
          .collect(),
      )
    }
    fn search_pass2(&self, sequences: &[Sequence], model: &Model) -> Result<Vec<SearchHit>, Report> {
      Ok(
        sequences
          .iter()
          .map(|s| SearchHit {
            seq_name: s.name.clone(),
            model_name: model.name.clone(),
            model_from: 1,
            model_to: s.len(),
            seq_from: 1,
            seq_to: s.len(),
            strand: Strand::Plus,
            bias: 0.0,
            score: 900.0,
            e_value: Some(1e-200),
          })
          .collect(),
      )
    }
  }

  struct FakeAlign;
  impl AlignEngine for FakeAlign {
    fn align_batch(&self, sequences: &[Sequence], _model: &Model, _max_matrix_mb: f64) -> Result<Vec<AlignmentResult>, Report> {
      Ok(sequences.iter().map(|s| flush_alignment(&s.name, &s.bases)).collect())
    }
    fn align_one(&self, sequence: &Sequence, _model: &Model, _max_matrix_mb: f64) -> Result<AlignOutcome, Report> {
      Ok(AlignOutcome::Success(flush_alignment(&sequence.name, &sequence.bases)))
    }
  }

  struct NoProteinHits;
  impl ProteinAligner for NoProteinHits {
    fn align(&self, _queries: &[ProteinQuery], _protein_db_path: &Path) -> Result<Vec<ProteinQueryRecord>, Report> {
      Ok(vec![])
    }
  }

  #[rstest]
  fn clean_positive_strand_cds_passes_with_no_alerts() -> Result<(), Report> {
    let model = single_cds_model("M", 900, None, None);
    let library = library_of(vec![model]);
    let mut bases = b"ATG".to_vec();
    bases.extend(vec![b'A'; 894]);
    bases.extend(b"TAA");
    let sequences = vec![Sequence::new("s1", bases)];

    let search = FakeSearch { model_name: "M".to_owned() };
    let align = FakeAlign;
    let protein = NoProteinHits;
    let pipeline = Pipeline::new(&search, &align, &protein, PipelineConfig::default(), CdsConfig::default())?;
    let (store, alert_log, report) = pipeline.run(&sequences, &library)?;

    assert!(alert_log.all().is_empty(), "{:?}", alert_log.all());
    assert_eq!(report.passing_seqlist, vec!["s1".to_owned()]);
    let feature_result = store.feature_result("s1", 0).unwrap();
    assert_eq!(feature_result.nucleotide_start, Some(1));
    assert_eq!(feature_result.nucleotide_stop, Some(900));
    assert_eq!(feature_result.corrected_stop, None);
    Ok(())
  }

  #[rstest]
  fn early_inframe_stop_fails_the_sequence_with_corrected_stop() -> Result<(), Report> {
    let model = single_cds_model("M", 900, None, None);
    let library = library_of(vec![model]);
    let mut bases = b"ATG".to_vec();
    bases.extend(vec![b'A'; 300]);
    bases.extend(b"TAA");
    bases.extend(vec![b'A'; 591]);
    bases.extend(b"TAA");
    let sequences = vec![Sequence::new("s1", bases)];

    let search = FakeSearch { model_name: "M".to_owned() };
    let align = FakeAlign;
    let protein = NoProteinHits;
    let pipeline = Pipeline::new(&search, &align, &protein, PipelineConfig::default(), CdsConfig::default())?;
    let (store, alert_log, report) = pipeline.run(&sequences, &library)?;

    assert!(alert_log.has_code_for_feature("s1", 0, AlertCode::EarlyStop));
    assert_eq!(store.feature_result("s1", 0).unwrap().corrected_stop, Some(306));
    assert_eq!(report.failing_seqlist, vec!["s1".to_owned()]);
    Ok(())
  }

  #[rstest]
  fn memory_overflow_isolates_one_sequence_and_exits_clean() -> Result<(), Report> {
    struct OverflowsMiddle;
    impl AlignEngine for OverflowsMiddle {
      fn align_batch(&self, _sequences: &[Sequence], _model: &Model, _max_matrix_mb: f64) -> Result<Vec<AlignmentResult>, Report> {
        Err(eyre::eyre!("batch failed: one sequence overflowed the matrix budget"))
      }
      fn align_one(&self, sequence: &Sequence, _model: &Model, _max_matrix_mb: f64) -> Result<AlignOutcome, Report> {
        if sequence.name == "middle" {
          Ok(AlignOutcome::Overflow)
        } else {
          Ok(AlignOutcome::Success(flush_alignment(&sequence.name, &sequence.bases)))
        }
      }
    }

    let model = single_cds_model("M", 12, None, None);
    let library = library_of(vec![model]);
    let mut bases = b"ATG".to_vec();
    bases.extend(vec![b'A'; 6]);
    bases.extend(b"TAA");
    let sequences = vec![
      Sequence::new("first", bases.clone()),
      Sequence::new("middle", bases.clone()),
      Sequence::new("third", bases),
    ];

    let search = FakeSearch { model_name: "M".to_owned() };
    let align = OverflowsMiddle;
    let protein = NoProteinHits;
    let pipeline = Pipeline::new(&search, &align, &protein, PipelineConfig::default(), CdsConfig::default())?;
    let (store, alert_log, _report) = pipeline.run(&sequences, &library)?;

    assert!(alert_log.has_code_for_sequence("middle", AlertCode::TooDivergent));
    assert!(store.feature_result("middle", 0).is_none());
    assert!(store.feature_result("first", 0).is_some());
    assert!(store.feature_result("third", 0).is_some());
    Ok(())
  }

  #[rstest]
  fn protein_only_lone_hit_above_threshold_flags_feature_with_no_nucleotide_prediction() -> Result<(), Report> {
    // Two independent CDS features on one model. The alignment only has residues over the
    // first half of the model; the second half is gapped end to end, so its feature never
    // resolves a nucleotide coordinate at all. A protein hit against that second feature
    // then takes the lone-hit path (no nucleotide prediction to reconcile against).
    let model = Model {
      name: "M".to_owned(),
      length: 900,
      group: None,
      subgroup: None,
      protein_db_path: Some(std::path::PathBuf::from("/db/protein")),
      cm_file: None,
      features: vec![
        Feature {
          index: 0,
          feature_type: FeatureType::CodingRegion,
          type_index: 1,
          product: Some("orf1".to_owned()),
          gene: None,
          segments: vec![Segment {
            model_range: Range::from_one_based_inclusive(1, 500),
            strand: Strand::Plus,
            map_to_feature_index: 0,
          }],
          parent_feature_idx: None,
          source_feature_idx: None,
          child_feature_indices: vec![],
        },
        Feature {
          index: 1,
          feature_type: FeatureType::CodingRegion,
          type_index: 2,
          product: Some("orf2".to_owned()),
          gene: None,
          segments: vec![Segment {
            model_range: Range::from_one_based_inclusive(501, 900),
            strand: Strand::Plus,
            map_to_feature_index: 1,
          }],
          parent_feature_idx: None,
          source_feature_idx: None,
          child_feature_indices: vec![],
        },
      ],
    };
    let library = library_of(vec![model]);

    struct GappedTail;
    impl AlignEngine for GappedTail {
      fn align_batch(&self, sequences: &[Sequence], _model: &Model, _max_matrix_mb: f64) -> Result<Vec<AlignmentResult>, Report> {
        Ok(
          sequences
            .iter()
            .map(|s| AlignmentResult {
              seq_name: s.name.clone(),
              reference_columns: vec![true; 900],
              aligned_bases: (0..900).map(|i| if i < 500 { Some(b'A') } else { None }).collect(),
              posterior_probs: (0..900).map(|i| if i < 500 { Some('*') } else { None }).collect(),
              inserts: vec![],
            })
            .collect(),
        )
      }
      fn align_one(&self, sequence: &Sequence, model: &Model, max_matrix_mb: f64) -> Result<AlignOutcome, Report> {
        Ok(AlignOutcome::Success(self.align_batch(std::slice::from_ref(sequence), model, max_matrix_mb)?.remove(0)))
      }
    }

    struct LoneHit;
    impl ProteinAligner for LoneHit {
      fn align(&self, queries: &[ProteinQuery], _protein_db_path: &Path) -> Result<Vec<ProteinQueryRecord>, Report> {
        Ok(
          queries
            .iter()
            .filter(|q| q.feature_idx == 1)
            .map(|q| ProteinQueryRecord {
              seq_name: q.seq_name.clone(),
              feature_idx: q.feature_idx,
              score: 120.0,
              start: 1,
              stop: 400,
              strand: Strand::Plus,
              max_insert: 0,
              max_delete: 0,
              has_internal_stop: false,
              is_full_sequence_query: true,
            })
            .collect(),
        )
      }
    }

    let sequences = vec![Sequence::new("s1", vec![b'A'; 500])];

    let search = FakeSearch { model_name: "M".to_owned() };
    let align = GappedTail;
    let protein = LoneHit;
    let pipeline = Pipeline::new(&search, &align, &protein, PipelineConfig::default(), CdsConfig::default())?;
    let (store, alert_log, _report) = pipeline.run(&sequences, &library)?;

    let lone_hit = store.feature_result("s1", 1).expect("lone protein hit records a feature result");
    assert!(!lone_hit.has_nucleotide_prediction());
    assert_eq!(lone_hit.protein_start, Some(1));
    assert_eq!(lone_hit.protein_stop, Some(400));
    assert!(alert_log.has_code_for_feature("s1", 1, AlertCode::ProteinLoneHit));
    assert!(!alert_log.has_code_for_sequence("s1", AlertCode::ZeroFeaturesAnnotated));
    Ok(())
  }

  #[rstest]
  fn unexpected_subgroup_is_flagged_without_unexpected_group() -> Result<(), Report> {
    struct TwoModelSearch;
    impl SearchEngine for TwoModelSearch {
      fn search_pass1(&self, sequences: &[Sequence], _library: &ModelLibrary) -> Result<Vec<SearchHit>, Report> {
        let mut hits = Vec::new();
        for s in sequences {
          hits.push(SearchHit {
            seq_name: s.name.clone(),
            model_name: "M2".to_owned(),
            model_from: 1,
            model_to: s.len(),
            seq_from: 1,
            seq_to: s.len(),
            strand: Strand::Plus,
            bias: 0.0,
            score: 900.0,
            e_value: Some(1e-200),
          });
          hits.push(SearchHit {
            seq_name: s.name.clone(),
            model_name: "M1".to_owned(),
            model_from: 1,
            model_to: s.len(),
            seq_from: 1,
            seq_to: s.len(),
            strand: Strand::Plus,
            bias: 0.0,
            score: 500.0,
            e_value: Some(1e-100),
          });
        }
        Ok(hits)
      }
      fn search_pass2(&self, sequences: &[Sequence], model: &Model) -> Result<Vec<SearchHit>, Report> {
        Ok(
          sequences
            .iter()
            .map(|s| SearchHit {
              seq_name: s.name.clone(),
              model_name: model.name.clone(),
              model_from: 1,
              model_to: s.len(),
              seq_from: 1,
              seq_to: s.len(),
              strand: Strand::Plus,
              bias: 0.0,
              score: 900.0,
              e_value: Some(1e-200),
            })
            .collect(),
        )
      }
    }

    let model_g2 = single_cds_model("M2", 900, Some("G"), Some("G.II"));
    let model_g1 = single_cds_model("M1", 900, Some("G"), Some("G.I"));
    let library = library_of(vec![model_g2, model_g1]);
    let mut bases = b"ATG".to_vec();
    bases.extend(vec![b'A'; 894]);
    bases.extend(b"TAA");
    let sequences = vec![Sequence::new("s1", bases)];

    let search = TwoModelSearch;
    let align = FakeAlign;
    let protein = NoProteinHits;
    let mut config = PipelineConfig::default();
    config.expected_group = Some("G".to_owned());
    config.expected_subgroup = Some("G.I".to_owned());
    let pipeline = Pipeline::new(&search, &align, &protein, config, CdsConfig::default())?;
    let (_store, alert_log, _report) = pipeline.run(&sequences, &library)?;

    assert!(alert_log.has_code_for_sequence("s1", AlertCode::UnexpectedSubgroup));
    assert!(!alert_log.has_code_for_sequence("s1", AlertCode::UnexpectedGroup));
    Ok(())
  }
}
