use crate::model::{Model, ModelLibrary};
use crate::sequence::{Sequence, Strand};
use eyre::Report;
use serde::{Deserialize, Serialize};

/// One hit line from a search tool's output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
  pub seq_name: String,
  pub model_name: String,
  pub model_from: usize,
  pub model_to: usize,
  pub seq_from: usize,
  pub seq_to: usize,
  pub strand: Strand,
  pub bias: f64,
  pub score: f64,
  pub e_value: Option<f64>,
}

impl SearchHit {
  pub fn seq_len(&self) -> usize {
    self.seq_to.abs_diff(self.seq_from) + 1
  }
}

/// External homology search engine, invoked once per pass. Real implementations shell
/// out to a covariance-model search tool from the CLI crate; tests supply a fake.
pub trait SearchEngine: Send + Sync {
  /// Coarse classification pass: every sequence against every model in the library.
  fn search_pass1(&self, sequences: &[Sequence], library: &ModelLibrary) -> Result<Vec<SearchHit>, Report>;

  /// Focused refinement pass: sequences already assigned to one model, against only
  /// that model.
  fn search_pass2(&self, sequences: &[Sequence], model: &Model) -> Result<Vec<SearchHit>, Report>;
}
