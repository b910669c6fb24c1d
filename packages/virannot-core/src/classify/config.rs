use crate::error::ConfigError;
use eyre::Report;

/// Numeric thresholds the Classifier applies to a sequence's classification record.
/// All comparisons are epsilon-tolerant to avoid boundary-precision artifacts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationThresholds {
  pub low_coverage: f64,
  pub low_score: f64,
  pub very_low_score: f64,
  pub low_diff: f64,
  pub very_low_diff: f64,
  pub bias_fraction: f64,
  pub group_threshold: f64,
  pub epsilon: f64,
}

impl Default for ClassificationThresholds {
  fn default() -> Self {
    Self {
      low_coverage: 0.9,
      low_score: 0.3,
      very_low_score: 0.2,
      low_diff: 0.06,
      very_low_diff: 0.006,
      bias_fraction: 0.25,
      group_threshold: 0.3,
      epsilon: 1e-6,
    }
  }
}

impl ClassificationThresholds {
  /// The very-low variant of a threshold must be strictly tighter than the low variant,
  /// so that crossing it implies the low threshold was already crossed.
  pub fn validate(&self) -> Result<(), Report> {
    if self.very_low_score >= self.low_score {
      return Err(ConfigError::Threshold(format!(
        "very-low-score ({}) must be strictly less than low-score ({})",
        self.very_low_score, self.low_score
      ))
      .into());
    }
    if self.very_low_diff >= self.low_diff {
      return Err(ConfigError::Threshold(format!(
        "very-low-diff ({}) must be strictly less than low-diff ({})",
        self.very_low_diff, self.low_diff
      ))
      .into());
    }
    Ok(())
  }
}
