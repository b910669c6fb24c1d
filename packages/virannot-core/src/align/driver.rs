use crate::align::config::AlignmentConfig;
use crate::align::engine::{AlignEngine, AlignOutcome, AlignmentResult};
use crate::alert::{AlertCode, AlertLog, AlertTarget};
use crate::model::Model;
use crate::sequence::Sequence;
use eyre::Report;

/// Aligns classified sequences to their assigned model, isolating matrix-overflow
/// failures one sequence at a time instead of losing the whole batch.
pub struct AlignerDriver<'a> {
  engine: &'a dyn AlignEngine,
  config: AlignmentConfig,
}

impl<'a> AlignerDriver<'a> {
  pub fn new(engine: &'a dyn AlignEngine, config: AlignmentConfig) -> Self {
    Self { engine, config }
  }

  /// Aligns every sequence in the batch. On a whole-batch failure, falls back to
  /// one-sequence-per-file isolation: sequences that overflow the matrix budget get a
  /// `too-divergent` alert and no alignment; the rest are retained.
  pub fn align_sequences(
    &self,
    sequences: &[Sequence],
    model: &Model,
    alert_log: &mut AlertLog,
  ) -> Result<Vec<AlignmentResult>, Report> {
    match self.engine.align_batch(sequences, model, self.config.max_matrix_mb) {
      Ok(results) => Ok(results),
      Err(_batch_failure) => self.align_isolated(sequences, model, alert_log),
    }
  }

  fn align_isolated(
    &self,
    sequences: &[Sequence],
    model: &Model,
    alert_log: &mut AlertLog,
  ) -> Result<Vec<AlignmentResult>, Report> {
    let mut results = Vec::new();
    for sequence in sequences {
      match self.engine.align_one(sequence, model, self.config.max_matrix_mb)? {
        AlignOutcome::Success(result) => results.push(result),
        AlignOutcome::Overflow => {
          alert_log.add(
            AlertCode::TooDivergent,
            AlertTarget::Sequence {
              seq_name: sequence.name.clone(),
            },
            format!("alignment matrix exceeded the {} MB budget", self.config.max_matrix_mb),
          )?;
        }
      }
    }
    Ok(results)
  }
}

#[cfg(test)]
mod aligner_driver_tests {
  use super::*;
  use crate::alert::AlertRegistry;
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn model() -> Model {
    Model {
      name: "M".to_owned(),
      length: 900,
      group: None,
      subgroup: None,
      protein_db_path: None,
      cm_file: None,
      features: vec![],
    }
  }

  fn bare_alignment(seq_name: &str) -> AlignmentResult {
    AlignmentResult {
      seq_name: seq_name.to_owned(),
      reference_columns: vec![],
      aligned_bases: vec![],
      posterior_probs: vec![],
      inserts: vec![],
    }
  }

  struct OverflowsMiddleEngine {
    calls: AtomicUsize,
  }

  impl AlignEngine for OverflowsMiddleEngine {
    fn align_batch(&self, _sequences: &[Sequence], _model: &Model, _max_matrix_mb: f64) -> Result<Vec<AlignmentResult>, Report> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Err(eyre::eyre!("batch job failed: matrix overflow somewhere in the batch"))
    }

    fn align_one(&self, sequence: &Sequence, _model: &Model, _max_matrix_mb: f64) -> Result<AlignOutcome, Report> {
      if sequence.name == "middle" {
        Ok(AlignOutcome::Overflow)
      } else {
        Ok(AlignOutcome::Success(bare_alignment(&sequence.name)))
      }
    }
  }

  #[rstest]
  fn isolates_single_sequence_overflow_after_batch_failure() {
    let engine = OverflowsMiddleEngine { calls: AtomicUsize::new(0) };
    let driver = AlignerDriver::new(&engine, AlignmentConfig::default());
    let sequences = vec![
      Sequence::new("first", b"ACGT".to_vec()),
      Sequence::new("middle", b"ACGT".to_vec()),
      Sequence::new("third", b"ACGT".to_vec()),
    ];
    let mut log = AlertLog::new(AlertRegistry::new());
    let results = driver.align_sequences(&sequences, &model(), &mut log).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].seq_name, "first");
    assert_eq!(results[1].seq_name, "third");
    assert!(log.has_code_for_sequence("middle", AlertCode::TooDivergent));
    assert!(!log.has_code_for_sequence("first", AlertCode::TooDivergent));
  }
}
