use thiserror::Error;

/// Shorthand for constructing a bare `eyre::Report` from a format string, in the style of
/// `eyre::eyre!`, but returning it wrapped in `Err` for use at the end of a function.
#[macro_export]
macro_rules! make_error {
  ($($arg:tt)*) => {
    Err(eyre::eyre!($($arg)*))
  };
}

/// Like `make_error!`, but marks the failure as an internal/pipeline-plane error rather than
/// a configuration error, for failures that indicate a broken invariant rather than bad input.
#[macro_export]
macro_rules! make_internal_report {
  ($($arg:tt)*) => {
    eyre::eyre!("Internal error (this is likely a bug): {}", format!($($arg)*))
  };
}

/// Configuration-plane errors: malformed inputs, missing files, invariant-violating model
/// metadata. Fatal before any sequence is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("In model-info file: {0}")]
  ModelInfo(String),

  #[error("Model '{model}' declares feature invariant violation: {detail}")]
  FeatureInvariant { model: String, detail: String },

  #[error("Threshold configuration is invalid: {0}")]
  Threshold(String),

  #[error("Expected subgroup '{subgroup}' was given without an expected group")]
  SubgroupWithoutGroup { subgroup: String },

  #[error("Posterior-probability string contains a character outside `0-9,*,.`: '{0}'")]
  InvalidPosteriorProbabilityChar(char),

  #[error("A feature's segments span more than one strand, which is not permitted: feature '{0}'")]
  MultiStrandFeature(String),

  #[error("Sequence name '{0}' contains a character reserved for feature-query naming (':' or '/')")]
  ReservedNameCharacter(String),

  #[error("Malformed fasta input: {0}")]
  Fasta(String),
}

/// Pipeline-plane errors: scheduler failures, output-file corruption, internal invariants
/// violated mid-run. Fatal, never partial.
#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("Job submission failed: {0}")]
  SubmissionFailed(String),

  #[error("Wall-clock budget of {budget_minutes} minutes exceeded; unfinished jobs: {unfinished:?}")]
  WallClockExceeded {
    budget_minutes: u64,
    unfinished: Vec<String>,
  },

  #[error("A sequence was assigned hits to more than one model in pass 2: '{0}'")]
  MultipleModelsInPass2(String),

  #[error("Coordinate-mapper sanity check failed for sequence '{sequence}': {detail}")]
  MapperInvariantViolated { sequence: String, detail: String },

  #[error("Attempted to add an alert that was already recorded for this target: {0}")]
  DuplicateAlert(String),
}
