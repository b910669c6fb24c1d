use crate::alert::{AlertCode, AlertLog, AlertTarget};
use crate::feature::builder::{assemble_feature, downstream_window};
use crate::feature::codon::{first_inframe_stop, is_start_codon, is_stop_codon};
use crate::model::{Feature, FeatureType, Model};
use crate::results::ResultsStore;
use crate::sequence::Sequence;
use eyre::Report;
use std::collections::BTreeMap;

/// Alert codes that, when present on a coding-region, propagate as `parent-has-error`
/// to every mature-peptide child.
const PROPAGATING_CODES: &[AlertCode] = &[
  AlertCode::InvalidStart,
  AlertCode::InvalidStop,
  AlertCode::EarlyStop,
  AlertCode::ExtendedStop,
  AlertCode::NoStopFound,
];

/// Per-feature alternative start codons, keyed by feature index. Features absent from
/// the map are checked against the standard ATG start only.
#[derive(Debug, Clone, Default)]
pub struct CdsConfig {
  pub alternative_starts: BTreeMap<usize, Vec<[u8; 3]>>,
}

fn target(seq_name: &str, feature_idx: usize) -> AlertTarget {
  AlertTarget::Feature {
    seq_name: seq_name.to_owned(),
    feature_idx,
  }
}

/// Runs the CDS state machine over every coding-region and mature-peptide feature of
/// `model` for one sequence, then propagates `parent-has-error` to mature-peptide
/// children of coding-regions that picked up a feature-level alert.
pub fn evaluate_model_features(
  model: &Model,
  sequence: &Sequence,
  config: &CdsConfig,
  store: &mut ResultsStore,
  alert_log: &mut AlertLog,
) -> Result<(), Report> {
  for feature in &model.features {
    if feature.is_duplicate() {
      continue;
    }
    evaluate_feature(feature, sequence, config, store, alert_log)?;
  }
  for feature in &model.features {
    if feature.feature_type != FeatureType::CodingRegion {
      continue;
    }
    if PROPAGATING_CODES.iter().any(|&code| alert_log.has_code_for_feature(&sequence.name, feature.index, code)) {
      for &child_idx in &feature.child_feature_indices {
        if !alert_log.has_code_for_feature(&sequence.name, child_idx, AlertCode::ParentHasError) {
          alert_log.add(AlertCode::ParentHasError, target(&sequence.name, child_idx), "parent coding-region has an error")?;
        }
      }
    }
  }
  Ok(())
}

fn evaluate_feature(
  feature: &Feature,
  sequence: &Sequence,
  config: &CdsConfig,
  store: &mut ResultsStore,
  alert_log: &mut AlertLog,
) -> Result<(), Report> {
  if !matches!(feature.feature_type, FeatureType::CodingRegion | FeatureType::MaturePeptide) {
    return Ok(());
  }
  let Some(result) = store.feature_result(&sequence.name, feature.index) else {
    return Ok(());
  };
  if !result.has_nucleotide_prediction() || result.five_truncated || result.three_truncated {
    return Ok(());
  }

  let Some(assembled) = assemble_feature(feature, sequence, store) else {
    return Ok(());
  };
  let len = assembled.nucleotides.len();
  if len < 3 {
    return Ok(());
  }
  if len % 3 != 0 {
    alert_log.add(AlertCode::NotMultipleOfThree, target(&sequence.name, feature.index), format!("length {len}"))?;
    return Ok(());
  }

  if feature.feature_type == FeatureType::MaturePeptide {
    if let Some(offset) = first_inframe_stop(&assembled.nucleotides[..len - 3]) {
      alert_log.add(
        AlertCode::EarlyStop,
        target(&sequence.name, feature.index),
        format!("in-frame stop at offset {offset}"),
      )?;
      store.set_corrected_stop(&sequence.name, feature.index, Some(assembled.positions[offset + 2]))?;
    }
    return Ok(());
  }

  let alt_starts = config.alternative_starts.get(&feature.index).cloned().unwrap_or_default();
  let start_valid = is_start_codon(&assembled.nucleotides[0..3], &alt_starts);
  if !start_valid {
    alert_log.add(AlertCode::InvalidStart, target(&sequence.name, feature.index), "predicted start is not a valid start codon")?;
    return Ok(());
  }

  let stop_valid = is_stop_codon(&assembled.nucleotides[len - 3..]);
  let early_stop_offset = first_inframe_stop(&assembled.nucleotides[..len - 3]);

  match (stop_valid, early_stop_offset) {
    (false, None) => {
      alert_log.add(AlertCode::InvalidStop, target(&sequence.name, feature.index), "predicted stop is not a valid stop codon")?;
      let extended = downstream_window(feature, sequence, store).and_then(|window| {
        first_inframe_stop(&window.nucleotides).map(|offset| window.positions[offset + 2])
      });
      match extended {
        Some(corrected_pos) => {
          alert_log.add(
            AlertCode::ExtendedStop,
            target(&sequence.name, feature.index),
            "in-frame stop found further 3' of the predicted stop",
          )?;
          store.set_corrected_stop(&sequence.name, feature.index, Some(corrected_pos))?;
        }
        None => {
          alert_log.add(AlertCode::NoStopFound, target(&sequence.name, feature.index), "no in-frame stop found on the sequence")?;
          store.set_corrected_stop(&sequence.name, feature.index, None)?;
        }
      }
    }
    (false, Some(offset)) => {
      alert_log.add(AlertCode::InvalidStop, target(&sequence.name, feature.index), "predicted stop is not a valid stop codon")?;
      alert_log.add(
        AlertCode::EarlyStop,
        target(&sequence.name, feature.index),
        format!("in-frame stop at offset {offset}"),
      )?;
      store.set_corrected_stop(&sequence.name, feature.index, Some(assembled.positions[offset + 2]))?;
    }
    (true, None) => {}
    (true, Some(offset)) => {
      alert_log.add(
        AlertCode::EarlyStop,
        target(&sequence.name, feature.index),
        format!("in-frame stop at offset {offset}"),
      )?;
      store.set_corrected_stop(&sequence.name, feature.index, Some(assembled.positions[offset + 2]))?;
    }
  }
  Ok(())
}
