use crate::align::config::AlignmentConfig;
use crate::classify::config::ClassificationThresholds;
use crate::error::ConfigError;
use crate::protein::config::ProteinConfig;
use crate::search::orchestrator::ParallelismPolicy;
use eyre::Report;

/// Aggregates every classification, alignment, protein-reconciliation and parallelism
/// tunable into one place, validated once at startup before any sequence is processed.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub classification: ClassificationThresholds,
  pub alignment: AlignmentConfig,
  pub protein: ProteinConfig,
  pub parallelism: ParallelismPolicy,
  pub expected_group: Option<String>,
  pub expected_subgroup: Option<String>,
  pub low_pp_threshold: f64,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      classification: ClassificationThresholds::default(),
      alignment: AlignmentConfig::default(),
      protein: ProteinConfig::default(),
      parallelism: ParallelismPolicy::default(),
      expected_group: None,
      expected_subgroup: None,
      low_pp_threshold: 0.8,
    }
  }
}

impl PipelineConfig {
  /// Enforces the cross-field invariants: `very-low < low` for score and diff
  /// thresholds (delegated to `ClassificationThresholds::validate`), and `subgroup`
  /// requires `group`.
  pub fn validate(&self) -> Result<(), Report> {
    self.classification.validate()?;
    if self.expected_subgroup.is_some() && self.expected_group.is_none() {
      return Err(
        ConfigError::SubgroupWithoutGroup {
          subgroup: self.expected_subgroup.clone().unwrap_or_default(),
        }
        .into(),
      );
    }
    Ok(())
  }
}

#[cfg(test)]
mod pipeline_config_tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn defaults_are_valid() {
    PipelineConfig::default().validate().unwrap();
  }

  #[rstest]
  fn rejects_subgroup_without_group() {
    let config = PipelineConfig {
      expected_subgroup: Some("G.I".to_owned()),
      ..PipelineConfig::default()
    };
    let err = config.validate().unwrap_err();
    assert!(format!("{err:#}").contains("without an expected group"));
  }

  #[rstest]
  fn rejects_invalid_classification_thresholds() {
    let config = PipelineConfig {
      classification: ClassificationThresholds {
        very_low_score: 0.5,
        low_score: 0.3,
        ..ClassificationThresholds::default()
      },
      ..PipelineConfig::default()
    };
    let err = config.validate().unwrap_err();
    assert!(format!("{err:#}").contains("very-low-score"));
  }
}
