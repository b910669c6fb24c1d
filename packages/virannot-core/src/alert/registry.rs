use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an alert is attached to a whole sequence or to one feature of a sequence.
///
/// This is fixed per alert kind: every code the registry knows about declares its scope once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertScope {
  Sequence,
  Feature,
}

/// Every alert kind the pipeline can emit, grouped by emitting component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertCode {
  // Classification (per-sequence)
  NoAnnotation,
  MinusStrand,
  LowCoverage,
  LowScore,
  VeryLowScore,
  LowScoreDifference,
  VeryLowScoreDifference,
  HighBias,
  UnexpectedGroup,
  UnexpectedSubgroup,

  // Alignment (per-feature)
  GapAt5primeBoundary,
  GapAt3primeBoundary,
  LowPpAt5primeBoundary,
  LowPpAt3primeBoundary,

  // Feature / CDS state machine (per-feature)
  InvalidStart,
  NotMultipleOfThree,
  InvalidStop,
  EarlyStop,
  ExtendedStop,
  NoStopFound,
  ParentHasError,

  // Protein reconciliation (per-feature)
  NoProteinHit,
  ConflictingStrand,
  Protein5primeTooLong,
  Protein5primeTooShort,
  Protein3primeTooLong,
  Protein3primeTooShort,
  ProteinLongInsert,
  ProteinLongDelete,
  ProteinTranslationStop,
  ProteinLoneHit,

  // Divergence (per-sequence)
  TooDivergent,

  // Annotation coverage (per-sequence)
  ZeroFeaturesAnnotated,
}

impl AlertCode {
  /// The stable, kebab-case wire identifier for this code, matching its serde rename.
  pub const fn as_str(self) -> &'static str {
    match self {
      Self::NoAnnotation => "no-annotation",
      Self::MinusStrand => "minus-strand",
      Self::LowCoverage => "low-coverage",
      Self::LowScore => "low-score",
      Self::VeryLowScore => "very-low-score",
      Self::LowScoreDifference => "low-score-difference",
      Self::VeryLowScoreDifference => "very-low-score-difference",
      Self::HighBias => "high-bias",
      Self::UnexpectedGroup => "unexpected-group",
      Self::UnexpectedSubgroup => "unexpected-subgroup",
      Self::GapAt5primeBoundary => "gap-at-5prime-boundary",
      Self::GapAt3primeBoundary => "gap-at-3prime-boundary",
      Self::LowPpAt5primeBoundary => "low-pp-at-5prime-boundary",
      Self::LowPpAt3primeBoundary => "low-pp-at-3prime-boundary",
      Self::InvalidStart => "invalid-start",
      Self::NotMultipleOfThree => "not-multiple-of-three",
      Self::InvalidStop => "invalid-stop",
      Self::EarlyStop => "early-stop",
      Self::ExtendedStop => "extended-stop",
      Self::NoStopFound => "no-stop-found",
      Self::ParentHasError => "parent-has-error",
      Self::NoProteinHit => "no-protein-hit",
      Self::ConflictingStrand => "conflicting-strand",
      Self::Protein5primeTooLong => "protein-5prime-too-long",
      Self::Protein5primeTooShort => "protein-5prime-too-short",
      Self::Protein3primeTooLong => "protein-3prime-too-long",
      Self::Protein3primeTooShort => "protein-3prime-too-short",
      Self::ProteinLongInsert => "protein-long-insert",
      Self::ProteinLongDelete => "protein-long-delete",
      Self::ProteinTranslationStop => "protein-translation-stop",
      Self::ProteinLoneHit => "protein-lone-hit",
      Self::TooDivergent => "too-divergent",
      Self::ZeroFeaturesAnnotated => "zero-features-annotated",
    }
  }
}

impl fmt::Display for AlertCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// One row of the Alert Registry: everything downstream code needs to know about an
/// `AlertCode`, independent of any particular instance.
#[derive(Debug, Clone, Copy)]
pub struct AlertKind {
  pub code: AlertCode,
  pub scope: AlertScope,
  /// If true, the Aligner Driver (and everything downstream of it) silently skips the
  /// sequence this alert is attached to. This is the *only* runtime hook that changes
  /// control flow; every other alert is purely informational and only affects the final
  /// PASS/FAIL verdict.
  pub prevents_annotation: bool,
  pub description: &'static str,
}

const REGISTRY_ROWS: &[AlertKind] = &[
  AlertKind {
    code: AlertCode::NoAnnotation,
    scope: AlertScope::Sequence,
    prevents_annotation: true,
    description: "Sequence had no pass-1 hit, or had a pass-1 hit but no pass-2 hit",
  },
  AlertKind {
    code: AlertCode::MinusStrand,
    scope: AlertScope::Sequence,
    prevents_annotation: true,
    description: "Best-scoring hits are on the minus strand of the model",
  },
  AlertKind {
    code: AlertCode::LowCoverage,
    scope: AlertScope::Sequence,
    prevents_annotation: false,
    description: "Summed pass-2 hit length covers too little of the sequence",
  },
  AlertKind {
    code: AlertCode::LowScore,
    scope: AlertScope::Sequence,
    prevents_annotation: false,
    description: "Pass-2 score per nucleotide is below the low-score threshold",
  },
  AlertKind {
    code: AlertCode::VeryLowScore,
    scope: AlertScope::Sequence,
    prevents_annotation: false,
    description: "Pass-2 score per nucleotide is below the very-low-score threshold",
  },
  AlertKind {
    code: AlertCode::LowScoreDifference,
    scope: AlertScope::Sequence,
    prevents_annotation: false,
    description: "Score difference between best and second-best model is too small",
  },
  AlertKind {
    code: AlertCode::VeryLowScoreDifference,
    scope: AlertScope::Sequence,
    prevents_annotation: false,
    description: "Score difference between best and second-best model is very small",
  },
  AlertKind {
    code: AlertCode::HighBias,
    scope: AlertScope::Sequence,
    prevents_annotation: false,
    description: "A large fraction of the pass-2 score is attributable to bias correction",
  },
  AlertKind {
    code: AlertCode::UnexpectedGroup,
    scope: AlertScope::Sequence,
    prevents_annotation: false,
    description: "Best-scoring model is not in the user-declared expected group",
  },
  AlertKind {
    code: AlertCode::UnexpectedSubgroup,
    scope: AlertScope::Sequence,
    prevents_annotation: false,
    description: "Best-scoring model is not in the user-declared expected subgroup",
  },
  AlertKind {
    code: AlertCode::GapAt5primeBoundary,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Alignment column at the segment's 5' model boundary is a gap",
  },
  AlertKind {
    code: AlertCode::GapAt3primeBoundary,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Alignment column at the segment's 3' model boundary is a gap",
  },
  AlertKind {
    code: AlertCode::LowPpAt5primeBoundary,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Posterior probability at the segment's 5' model boundary is below threshold",
  },
  AlertKind {
    code: AlertCode::LowPpAt3primeBoundary,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Posterior probability at the segment's 3' model boundary is below threshold",
  },
  AlertKind {
    code: AlertCode::InvalidStart,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Predicted start codon is not a valid (or configured alternative) start",
  },
  AlertKind {
    code: AlertCode::NotMultipleOfThree,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Feature nucleotide length is not a multiple of three",
  },
  AlertKind {
    code: AlertCode::InvalidStop,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Predicted stop codon is not a valid stop codon",
  },
  AlertKind {
    code: AlertCode::EarlyStop,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "An in-frame stop codon occurs before the predicted stop position",
  },
  AlertKind {
    code: AlertCode::ExtendedStop,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "No in-frame stop at the predicted position; one was found further 3'",
  },
  AlertKind {
    code: AlertCode::NoStopFound,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "No in-frame stop codon found anywhere on the sequence",
  },
  AlertKind {
    code: AlertCode::ParentHasError,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Propagated from a coding-region parent that has a feature- or protein-level error",
  },
  AlertKind {
    code: AlertCode::NoProteinHit,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Nucleotide prediction exists but the protein aligner reported no hit",
  },
  AlertKind {
    code: AlertCode::ConflictingStrand,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Protein hit strand disagrees with the nucleotide prediction's strand",
  },
  AlertKind {
    code: AlertCode::Protein5primeTooLong,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Protein alignment extends past the nucleotide prediction's 5' end",
  },
  AlertKind {
    code: AlertCode::Protein5primeTooShort,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Protein alignment's 5' start differs from the nucleotide prediction beyond tolerance",
  },
  AlertKind {
    code: AlertCode::Protein3primeTooLong,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Protein alignment extends past the nucleotide prediction's 3' end",
  },
  AlertKind {
    code: AlertCode::Protein3primeTooShort,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Protein alignment's 3' stop differs from the nucleotide prediction beyond tolerance",
  },
  AlertKind {
    code: AlertCode::ProteinLongInsert,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Protein alignment's largest insertion exceeds tolerance",
  },
  AlertKind {
    code: AlertCode::ProteinLongDelete,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Protein alignment's largest deletion exceeds tolerance",
  },
  AlertKind {
    code: AlertCode::ProteinTranslationStop,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Protein alignment contains an internal stop codon",
  },
  AlertKind {
    code: AlertCode::ProteinLoneHit,
    scope: AlertScope::Feature,
    prevents_annotation: false,
    description: "Protein hit exists with no corresponding nucleotide prediction",
  },
  AlertKind {
    code: AlertCode::TooDivergent,
    scope: AlertScope::Sequence,
    prevents_annotation: true,
    description: "Alignment of this sequence required more memory than the configured budget",
  },
  AlertKind {
    code: AlertCode::ZeroFeaturesAnnotated,
    scope: AlertScope::Sequence,
    prevents_annotation: false,
    description: "No feature on this sequence received either a nucleotide or protein prediction",
  },
];

/// Build-once catalog of every alert kind, consulted by every component that emits or
/// inspects alerts. The "prevents-annotation" behavior lives entirely in this table, not
/// as scattered ad-hoc checks in pipeline stages.
#[derive(Debug, Clone, Copy)]
pub struct AlertRegistry;

impl AlertRegistry {
  pub fn new() -> Self {
    Self
  }

  pub fn kind(&self, code: AlertCode) -> &'static AlertKind {
    REGISTRY_ROWS
      .iter()
      .find(|row| row.code == code)
      .unwrap_or_else(|| unreachable!("every AlertCode variant has a registry row"))
  }

  pub fn scope(&self, code: AlertCode) -> AlertScope {
    self.kind(code).scope
  }

  pub fn prevents_annotation(&self, code: AlertCode) -> bool {
    self.kind(code).prevents_annotation
  }

  pub fn description(&self, code: AlertCode) -> &'static str {
    self.kind(code).description
  }
}

impl Default for AlertRegistry {
  fn default() -> Self {
    Self::new()
  }
}
