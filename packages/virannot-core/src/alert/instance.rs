use crate::alert::registry::{AlertCode, AlertRegistry, AlertScope};
use crate::error::PipelineError;
use eyre::Report;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What an alert instance is attached to: a whole sequence, or one feature of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertTarget {
  Sequence { seq_name: String },
  Feature { seq_name: String, feature_idx: usize },
}

impl AlertTarget {
  pub fn seq_name(&self) -> &str {
    match self {
      Self::Sequence { seq_name } | Self::Feature { seq_name, .. } => seq_name,
    }
  }
}

/// One (alert-code, target, detail) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertInstance {
  pub code: AlertCode,
  pub target: AlertTarget,
  pub detail: String,
}

impl AlertInstance {
  pub fn new(code: AlertCode, target: AlertTarget, detail: impl Into<String>) -> Self {
    Self {
      code,
      target,
      detail: detail.into(),
    }
  }
}

/// Append-only collection of alert instances. Emitting the same (code, target) pair
/// twice is an error: callers that need both a sequence-level and a feature-level
/// alert from one condition call `add` twice with different targets, not twice with
/// the same one.
#[derive(Debug, Clone, Default)]
pub struct AlertLog {
  registry: Option<AlertRegistry>,
  seen: BTreeSet<(AlertCode, AlertTarget)>,
  instances: Vec<AlertInstance>,
}

impl AlertLog {
  pub fn new(registry: AlertRegistry) -> Self {
    Self {
      registry: Some(registry),
      seen: BTreeSet::new(),
      instances: Vec::new(),
    }
  }

  pub fn add(&mut self, code: AlertCode, target: AlertTarget, detail: impl Into<String>) -> Result<(), Report> {
    let key = (code, target.clone());
    if !self.seen.insert(key) {
      return Err(PipelineError::DuplicateAlert(format!("{code} on {target:?}")).into());
    }
    self.instances.push(AlertInstance::new(code, target, detail));
    Ok(())
  }

  pub fn all(&self) -> &[AlertInstance] {
    &self.instances
  }

  pub fn for_sequence<'a>(&'a self, seq_name: &'a str) -> impl Iterator<Item = &'a AlertInstance> + 'a {
    self.instances.iter().filter(move |a| a.target.seq_name() == seq_name)
  }

  pub fn sequence_level_for<'a>(&'a self, seq_name: &'a str) -> impl Iterator<Item = &'a AlertInstance> + 'a {
    self
      .for_sequence(seq_name)
      .filter(|a| matches!(a.target, AlertTarget::Sequence { .. }))
  }

  pub fn feature_level_for<'a>(&'a self, seq_name: &'a str) -> impl Iterator<Item = &'a AlertInstance> + 'a {
    self
      .for_sequence(seq_name)
      .filter(|a| matches!(a.target, AlertTarget::Feature { .. }))
  }

  pub fn for_feature<'a>(
    &'a self,
    seq_name: &'a str,
    feature_idx: usize,
  ) -> impl Iterator<Item = &'a AlertInstance> + 'a {
    self.instances.iter().filter(move |a| match &a.target {
      AlertTarget::Feature {
        seq_name: s,
        feature_idx: f,
      } => s == seq_name && *f == feature_idx,
      AlertTarget::Sequence { .. } => false,
    })
  }

  pub fn has_code_for_sequence(&self, seq_name: &str, code: AlertCode) -> bool {
    self.for_sequence(seq_name).any(|a| a.code == code)
  }

  pub fn has_code_for_feature(&self, seq_name: &str, feature_idx: usize, code: AlertCode) -> bool {
    self.for_feature(seq_name, feature_idx).any(|a| a.code == code)
  }

  /// Whether any alert on this sequence has the "prevents annotation" attribute set.
  pub fn prevents_annotation(&self, seq_name: &str) -> bool {
    let registry = self.registry.unwrap_or_default();
    self
      .sequence_level_for(seq_name)
      .any(|a| registry.prevents_annotation(a.code))
  }

  pub fn scope_of(&self, code: AlertCode) -> AlertScope {
    self.registry.unwrap_or_default().scope(code)
  }
}
