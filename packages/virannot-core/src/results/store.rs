use crate::error::PipelineError;
use crate::sequence::Strand;
use eyre::Report;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One hit interval contributed by a search pass, carried inside a `ClassificationRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitInterval {
  pub model_from: usize,
  pub model_to: usize,
  pub seq_from: usize,
  pub seq_to: usize,
  pub strand: Strand,
  pub bias: f64,
  pub score: f64,
  pub e_value: Option<f64>,
}

/// The accumulated record for one classification key: a top model plus every hit
/// collected against it, and the summary figures the Classifier reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRecord {
  pub model: String,
  pub hits: Vec<HitInterval>,
  pub bias: f64,
  pub summed_score: f64,
  pub coverage: f64,
}

impl ClassificationRecord {
  pub fn new(model: impl Into<String>) -> Self {
    Self {
      model: model.into(),
      hits: Vec::new(),
      bias: 0.0,
      summed_score: 0.0,
      coverage: 0.0,
    }
  }
}

/// The five classification keys a sequence accumulates during pass 1 and pass 2.
/// A closed struct of named optionals, not a dynamically keyed map: every key the
/// Classifier reads has a fixed slot here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
  pub best_overall_pass1: Option<ClassificationRecord>,
  pub second_best_different_model_pass1: Option<ClassificationRecord>,
  pub best_in_expected_group_pass1: Option<ClassificationRecord>,
  pub best_in_expected_subgroup_pass1: Option<ClassificationRecord>,
  pub best_in_pass2: Option<ClassificationRecord>,
}

/// Per sequence x segment. Written once by the Mapper; never mutated after.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentResult {
  pub seq_start: usize,
  pub seq_stop: usize,
  pub strand: Strand,
  pub five_flush: bool,
  pub three_flush: bool,
  pub five_truncated: bool,
  pub three_truncated: bool,
  pub five_boundary_is_gap: bool,
  pub three_boundary_is_gap: bool,
  pub five_boundary_pp: Option<f64>,
  pub three_boundary_pp: Option<f64>,
}

/// Per sequence x feature. The nucleotide fields (except `corrected_stop`) and the
/// truncation flags are written once by the Mapper/Builder when the record is first
/// inserted; `corrected_stop` is the one field the CDS state machine writes afterward.
/// Protein fields are written once by the Protein Reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureResult {
  pub nucleotide_start: Option<usize>,
  pub nucleotide_stop: Option<usize>,
  pub corrected_stop: Option<usize>,
  pub strand: Option<Strand>,
  pub five_truncated: bool,
  pub three_truncated: bool,

  pub protein_start: Option<usize>,
  pub protein_stop: Option<usize>,
  pub protein_strand: Option<Strand>,
  pub protein_max_insert: Option<usize>,
  pub protein_max_delete: Option<usize>,
  pub protein_truncation_stop: Option<usize>,
  pub protein_score: Option<f64>,
  pub protein_frame: Option<u8>,
}

impl FeatureResult {
  pub fn new(
    nucleotide_start: Option<usize>,
    nucleotide_stop: Option<usize>,
    strand: Option<Strand>,
    five_truncated: bool,
    three_truncated: bool,
  ) -> Self {
    Self {
      nucleotide_start,
      nucleotide_stop,
      corrected_stop: None,
      strand,
      five_truncated,
      three_truncated,
      protein_start: None,
      protein_stop: None,
      protein_strand: None,
      protein_max_insert: None,
      protein_max_delete: None,
      protein_truncation_stop: None,
      protein_score: None,
      protein_frame: None,
    }
  }

  pub fn has_nucleotide_prediction(&self) -> bool {
    self.nucleotide_start.is_some()
  }

  pub fn has_protein_prediction(&self) -> bool {
    self.protein_start.is_some()
  }

  pub fn is_annotated(&self) -> bool {
    self.has_nucleotide_prediction() || self.has_protein_prediction()
  }
}

/// Identifies one protein-query name, which the protein aligner reports either as a
/// bare sequence name or a sequence name plus a coordinate expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProteinQueryRecord {
  pub seq_name: String,
  pub feature_idx: usize,
  pub score: f64,
  pub start: usize,
  pub stop: usize,
  pub strand: Strand,
  pub max_insert: usize,
  pub max_delete: usize,
  pub has_internal_stop: bool,
  pub is_full_sequence_query: bool,
}

/// Central store the pipeline stages read from and write to, keyed by
/// (sequence, model, feature, segment). One writer per field; readers follow.
#[derive(Debug, Clone, Default)]
pub struct ResultsStore {
  classification: BTreeMap<String, ClassificationResult>,
  assigned_model: BTreeMap<String, String>,
  segments: BTreeMap<(String, usize, usize), SegmentResult>,
  features: BTreeMap<(String, usize), FeatureResult>,
}

impl ResultsStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn classification_entry(&mut self, seq_name: &str) -> &mut ClassificationResult {
    self.classification.entry(seq_name.to_owned()).or_default()
  }

  pub fn classification_for(&self, seq_name: &str) -> Option<&ClassificationResult> {
    self.classification.get(seq_name)
  }

  pub fn assign_model(&mut self, seq_name: impl Into<String>, model_name: impl Into<String>) {
    self.assigned_model.insert(seq_name.into(), model_name.into());
  }

  pub fn assigned_model(&self, seq_name: &str) -> Option<&str> {
    self.assigned_model.get(seq_name).map(String::as_str)
  }

  pub fn insert_segment_result(&mut self, seq_name: &str, feature_idx: usize, segment_idx: usize, result: SegmentResult) {
    self
      .segments
      .insert((seq_name.to_owned(), feature_idx, segment_idx), result);
  }

  pub fn segment_result(&self, seq_name: &str, feature_idx: usize, segment_idx: usize) -> Option<&SegmentResult> {
    self.segments.get(&(seq_name.to_owned(), feature_idx, segment_idx))
  }

  pub fn segment_results_for_feature<'a>(
    &'a self,
    seq_name: &'a str,
    feature_idx: usize,
  ) -> impl Iterator<Item = (usize, &'a SegmentResult)> + 'a {
    self
      .segments
      .iter()
      .filter(move |((s, f, _), _)| s == seq_name && *f == feature_idx)
      .map(|((_, _, seg_idx), result)| (*seg_idx, result))
  }

  pub fn insert_feature_result(&mut self, seq_name: &str, feature_idx: usize, result: FeatureResult) {
    self.features.insert((seq_name.to_owned(), feature_idx), result);
  }

  pub fn feature_result(&self, seq_name: &str, feature_idx: usize) -> Option<&FeatureResult> {
    self.features.get(&(seq_name.to_owned(), feature_idx))
  }

  pub fn feature_results_for_sequence<'a>(
    &'a self,
    seq_name: &'a str,
  ) -> impl Iterator<Item = (usize, &'a FeatureResult)> + 'a {
    self
      .features
      .iter()
      .filter(move |((s, _), _)| s == seq_name)
      .map(|((_, feature_idx), result)| (*feature_idx, result))
  }

  /// Every sequence that has a Feature Result recorded for a given feature, regardless
  /// of model. Used by the Protein Reconciler to find nucleotide predictions that need
  /// reconciling even when no protein hit exists for them.
  pub fn sequences_with_feature_result(&self, feature_idx: usize) -> impl Iterator<Item = &str> {
    self
      .features
      .iter()
      .filter(move |((_, f), _)| *f == feature_idx)
      .map(|((s, _), _)| s.as_str())
  }

  /// Writes the corrected-stop field on an already-inserted Feature Result. This is the
  /// one field the CDS state machine mutates after the Mapper/Builder's initial write.
  pub fn set_corrected_stop(&mut self, seq_name: &str, feature_idx: usize, corrected_stop: Option<usize>) -> Result<(), Report> {
    let result = self
      .features
      .get_mut(&(seq_name.to_owned(), feature_idx))
      .ok_or_else(|| {
        PipelineError::MapperInvariantViolated {
          sequence: seq_name.to_owned(),
          detail: format!("no Feature Result for feature {feature_idx} exists to correct"),
        }
      })?;
    result.corrected_stop = corrected_stop;
    Ok(())
  }

  /// Writes the protein fields on an already-inserted Feature Result.
  pub fn set_protein_fields(
    &mut self,
    seq_name: &str,
    feature_idx: usize,
    query: &ProteinQueryRecord,
  ) -> Result<(), Report> {
    let result = self
      .features
      .get_mut(&(seq_name.to_owned(), feature_idx))
      .ok_or_else(|| {
        PipelineError::MapperInvariantViolated {
          sequence: seq_name.to_owned(),
          detail: format!("no Feature Result for feature {feature_idx} exists to reconcile"),
        }
      })?;
    result.protein_start = Some(query.start);
    result.protein_stop = Some(query.stop);
    result.protein_strand = Some(query.strand);
    result.protein_max_insert = Some(query.max_insert);
    result.protein_max_delete = Some(query.max_delete);
    result.protein_score = Some(query.score);
    Ok(())
  }

  pub fn has_any_feature_result(&self, seq_name: &str) -> bool {
    self.feature_results_for_sequence(seq_name).any(|(_, r)| r.is_annotated())
  }
}
