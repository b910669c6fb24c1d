use crate::model::Model;
use crate::sequence::Sequence;
use eyre::Report;
use serde::{Deserialize, Serialize};

/// One insertion of the sequence relative to the model, from the aligner's side-channel
/// insert file: `(model-position-before-insert, sequence-start-of-insert, insert-length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertRecord {
  pub model_pos_before: usize,
  pub seq_start: usize,
  pub len: usize,
}

/// One sequence's alignment to a model: the column-labeled alignment itself, which
/// columns are model positions vs. insertions, the per-column posterior-probability
/// string, and the insert side-channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentResult {
  pub seq_name: String,
  /// One entry per alignment column: `true` if the column is a model (reference)
  /// position, `false` if it is an insertion column.
  pub reference_columns: Vec<bool>,
  /// One entry per alignment column: the aligned nucleotide, or `None` for a gap.
  pub aligned_bases: Vec<Option<u8>>,
  /// One entry per alignment column: the posterior-probability character, or `None`
  /// for a gap.
  pub posterior_probs: Vec<Option<char>>,
  pub inserts: Vec<InsertRecord>,
}

/// Whether a single-sequence alignment attempt succeeded or exceeded the matrix budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlignOutcome {
  Success(AlignmentResult),
  Overflow,
}

/// External alignment engine. Real implementations shell out to a covariance-model
/// aligner from the CLI crate; tests supply a fake.
pub trait AlignEngine: Send + Sync {
  /// Aligns a batch of sequences to one model in a single invocation. The real tool may
  /// fail the entire batch if any sequence's matrix exceeds `max_matrix_mb`; this method
  /// is free to surface that as an `Err` without attributing it to one sequence.
  fn align_batch(&self, sequences: &[Sequence], model: &Model, max_matrix_mb: f64) -> Result<Vec<AlignmentResult>, Report>;

  /// Aligns one sequence in isolation, distinguishing a matrix-budget overflow from
  /// other failures.
  fn align_one(&self, sequence: &Sequence, model: &Model, max_matrix_mb: f64) -> Result<AlignOutcome, Report>;
}
