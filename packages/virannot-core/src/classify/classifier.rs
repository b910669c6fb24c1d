use crate::alert::{AlertCode, AlertLog, AlertTarget};
use crate::classify::config::ClassificationThresholds;
use crate::results::{ClassificationRecord, ClassificationResult, ResultsStore};
use crate::sequence::Strand;
use eyre::Report;

fn target(seq_name: &str) -> AlertTarget {
  AlertTarget::Sequence {
    seq_name: seq_name.to_owned(),
  }
}

/// Sums score per strand across a record's hits and returns (best strand, summed length
/// on that strand, summed score on that strand).
fn summarize_best_strand(record: &ClassificationRecord) -> (Strand, usize, f64) {
  let mut plus_score = 0.0;
  let mut minus_score = 0.0;
  for hit in &record.hits {
    match hit.strand {
      Strand::Plus => plus_score += hit.score,
      Strand::Minus => minus_score += hit.score,
    }
  }
  let best_strand = if minus_score > plus_score { Strand::Minus } else { Strand::Plus };
  let (len, score) = record
    .hits
    .iter()
    .filter(|h| h.strand == best_strand)
    .fold((0usize, 0.0), |(len, score), h| {
      (len + h.seq_to.abs_diff(h.seq_from) + 1, score + h.score)
    });
  (best_strand, len, score)
}

/// Applies the threshold table to one sequence's classification record, assigns the
/// sequence's best model in the store, and emits every applicable alert.
pub struct Classifier {
  thresholds: ClassificationThresholds,
  expected_group: Option<String>,
  expected_subgroup: Option<String>,
}

impl Classifier {
  pub fn new(
    thresholds: ClassificationThresholds,
    expected_group: Option<String>,
    expected_subgroup: Option<String>,
  ) -> Result<Self, Report> {
    thresholds.validate()?;
    Ok(Self {
      thresholds,
      expected_group,
      expected_subgroup,
    })
  }

  pub fn classify_sequence(
    &self,
    seq_name: &str,
    classification: &ClassificationResult,
    seq_len: usize,
    store: &mut ResultsStore,
    alert_log: &mut AlertLog,
  ) -> Result<(), Report> {
    let eps = self.thresholds.epsilon;

    let has_pass1 = classification.best_overall_pass1.is_some();
    let has_pass2 = classification.best_in_pass2.is_some();
    if !has_pass1 || !has_pass2 {
      alert_log.add(AlertCode::NoAnnotation, target(seq_name), "no pass-1 hit, or pass-1 hit with no pass-2 hit")?;
      return Ok(());
    }

    let pass2 = classification.best_in_pass2.as_ref().unwrap();
    store.assign_model(seq_name, pass2.model.clone());

    let (best_strand, summed_len, summed_score) = summarize_best_strand(pass2);
    if seq_len > 0 {
      let coverage = summed_len as f64 / seq_len as f64;
      if coverage < self.thresholds.low_coverage - eps {
        alert_log.add(AlertCode::LowCoverage, target(seq_name), format!("coverage {coverage:.4}"))?;
      }

      let score_per_nt = summed_score / seq_len as f64;
      if score_per_nt < self.thresholds.very_low_score - eps {
        alert_log.add(AlertCode::VeryLowScore, target(seq_name), format!("score/nt {score_per_nt:.4}"))?;
      } else if score_per_nt < self.thresholds.low_score - eps {
        alert_log.add(AlertCode::LowScore, target(seq_name), format!("score/nt {score_per_nt:.4}"))?;
      }
    }

    let bias_denominator = pass2.summed_score + pass2.bias;
    if bias_denominator > 0.0 {
      let bias_fraction = pass2.bias / bias_denominator;
      if bias_fraction > self.thresholds.bias_fraction + eps {
        alert_log.add(AlertCode::HighBias, target(seq_name), format!("bias fraction {bias_fraction:.4}"))?;
      }
    }

    if seq_len > 0 {
      if let (Some(overall), Some(second)) = (
        &classification.best_overall_pass1,
        &classification.second_best_different_model_pass1,
      ) {
        let diff_per_nt = (overall.summed_score - second.summed_score) / seq_len as f64;
        if diff_per_nt < self.thresholds.very_low_diff - eps {
          alert_log.add(
            AlertCode::VeryLowScoreDifference,
            target(seq_name),
            format!("diff/nt {diff_per_nt:.4}"),
          )?;
        } else if diff_per_nt < self.thresholds.low_diff - eps {
          alert_log.add(
            AlertCode::LowScoreDifference,
            target(seq_name),
            format!("diff/nt {diff_per_nt:.4}"),
          )?;
        }
      }

      if let Some(subgroup) = &self.expected_subgroup {
        self.check_unexpected(
          seq_name,
          &classification.best_overall_pass1,
          &classification.best_in_expected_subgroup_pass1,
          seq_len,
          AlertCode::UnexpectedSubgroup,
          subgroup,
          alert_log,
        )?;
      } else if let Some(group) = &self.expected_group {
        self.check_unexpected(
          seq_name,
          &classification.best_overall_pass1,
          &classification.best_in_expected_group_pass1,
          seq_len,
          AlertCode::UnexpectedGroup,
          group,
          alert_log,
        )?;
      }
    }

    if best_strand == Strand::Minus {
      alert_log.add(AlertCode::MinusStrand, target(seq_name), "best pass-2 strand is minus")?;
    }

    Ok(())
  }

  #[allow(clippy::too_many_arguments)]
  fn check_unexpected(
    &self,
    seq_name: &str,
    overall: &Option<ClassificationRecord>,
    expected_scope_best: &Option<ClassificationRecord>,
    seq_len: usize,
    code: AlertCode,
    expectation_name: &str,
    alert_log: &mut AlertLog,
  ) -> Result<(), Report> {
    let Some(overall) = overall else { return Ok(()) };
    let eps = self.thresholds.epsilon;
    let fires = match expected_scope_best {
      None => true,
      Some(in_scope) => {
        let diff = (overall.summed_score - in_scope.summed_score) / seq_len as f64;
        diff > self.thresholds.group_threshold + eps
      }
    };
    if fires {
      alert_log.add(code, target(seq_name), format!("expected '{expectation_name}' not matched by best hit"))?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod classifier_tests {
  use super::*;
  use crate::results::HitInterval;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn interval(score: f64, strand: Strand) -> HitInterval {
    HitInterval {
      model_from: 1,
      model_to: 100,
      seq_from: 1,
      seq_to: 100,
      strand,
      bias: 0.0,
      score,
      e_value: None,
    }
  }

  fn record(model: &str, score: f64, strand: Strand) -> ClassificationRecord {
    ClassificationRecord {
      model: model.to_owned(),
      hits: vec![interval(score, strand)],
      bias: 0.0,
      summed_score: score,
      coverage: 0.0,
    }
  }

  #[rstest]
  fn emits_no_annotation_without_pass2_hit() {
    let classifier = Classifier::new(ClassificationThresholds::default(), None, None).unwrap();
    let mut store = ResultsStore::new();
    let mut log = AlertLog::new(crate::alert::AlertRegistry::new());
    let classification = ClassificationResult {
      best_overall_pass1: Some(record("M1", 100.0, Strand::Plus)),
      ..Default::default()
    };
    classifier
      .classify_sequence("s1", &classification, 100, &mut store, &mut log)
      .unwrap();
    assert!(log.has_code_for_sequence("s1", AlertCode::NoAnnotation));
    assert!(store.assigned_model("s1").is_none());
  }

  #[rstest]
  fn emits_very_low_score_not_low_score() {
    let classifier = Classifier::new(ClassificationThresholds::default(), None, None).unwrap();
    let mut store = ResultsStore::new();
    let mut log = AlertLog::new(crate::alert::AlertRegistry::new());
    let classification = ClassificationResult {
      best_overall_pass1: Some(record("M1", 100.0, Strand::Plus)),
      best_in_pass2: Some(record("M1", 10.0, Strand::Plus)),
      ..Default::default()
    };
    classifier
      .classify_sequence("s1", &classification, 100, &mut store, &mut log)
      .unwrap();
    assert!(log.has_code_for_sequence("s1", AlertCode::VeryLowScore));
    assert!(!log.has_code_for_sequence("s1", AlertCode::LowScore));
    assert_eq!(store.assigned_model("s1"), Some("M1"));
  }

  #[rstest]
  fn subgroup_check_suppresses_group_check() {
    let classifier = Classifier::new(
      ClassificationThresholds::default(),
      Some("G".to_owned()),
      Some("G.I".to_owned()),
    )
    .unwrap();
    let mut store = ResultsStore::new();
    let mut log = AlertLog::new(crate::alert::AlertRegistry::new());
    let classification = ClassificationResult {
      best_overall_pass1: Some(record("M1", 100.0, Strand::Plus)),
      best_in_pass2: Some(record("M1", 100.0, Strand::Plus)),
      best_in_expected_subgroup_pass1: Some(record("M2", 50.0, Strand::Plus)),
      best_in_expected_group_pass1: Some(record("M1", 100.0, Strand::Plus)),
      ..Default::default()
    };
    classifier
      .classify_sequence("s1", &classification, 100, &mut store, &mut log)
      .unwrap();
    assert!(log.has_code_for_sequence("s1", AlertCode::UnexpectedSubgroup));
    assert!(!log.has_code_for_sequence("s1", AlertCode::UnexpectedGroup));
  }

  #[rstest]
  fn minus_strand_fires_when_best_strand_is_minus() {
    let classifier = Classifier::new(ClassificationThresholds::default(), None, None).unwrap();
    let mut store = ResultsStore::new();
    let mut log = AlertLog::new(crate::alert::AlertRegistry::new());
    let classification = ClassificationResult {
      best_overall_pass1: Some(record("M1", 100.0, Strand::Minus)),
      best_in_pass2: Some(record("M1", 100.0, Strand::Minus)),
      ..Default::default()
    };
    classifier
      .classify_sequence("s1", &classification, 100, &mut store, &mut log)
      .unwrap();
    assert!(log.has_code_for_sequence("s1", AlertCode::MinusStrand));
  }
}
