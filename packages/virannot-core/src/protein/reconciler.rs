use crate::alert::{AlertCode, AlertLog, AlertTarget};
use crate::model::{FeatureType, Model};
use crate::protein::config::ProteinConfig;
use crate::results::{FeatureResult, ProteinQueryRecord, ResultsStore};
use eyre::Report;
use std::collections::BTreeMap;

const PROPAGATING_CODES: &[AlertCode] = &[
  AlertCode::NoProteinHit,
  AlertCode::ConflictingStrand,
  AlertCode::Protein5primeTooLong,
  AlertCode::Protein5primeTooShort,
  AlertCode::Protein3primeTooLong,
  AlertCode::Protein3primeTooShort,
  AlertCode::ProteinLongInsert,
  AlertCode::ProteinLongDelete,
  AlertCode::ProteinTranslationStop,
];

fn target(seq_name: &str, feature_idx: usize) -> AlertTarget {
  AlertTarget::Feature {
    seq_name: seq_name.to_owned(),
    feature_idx,
  }
}

/// Reduces a batch of protein hits to the single highest-scoring hit per
/// (sequence, feature), as required before reconciliation.
pub fn best_hit_per_feature(hits: &[ProteinQueryRecord]) -> BTreeMap<(String, usize), ProteinQueryRecord> {
  let mut best: BTreeMap<(String, usize), ProteinQueryRecord> = BTreeMap::new();
  for hit in hits {
    let key = (hit.seq_name.clone(), hit.feature_idx);
    match best.get(&key) {
      Some(existing) if existing.score >= hit.score => {}
      _ => {
        best.insert(key, hit.clone());
      }
    }
  }
  best
}

/// Compares every coding-region's protein hit (if any) against its Feature Result,
/// records the protein fields in the store, and emits discrepancy alerts, then
/// propagates `parent-has-error` to mature-peptide children.
pub fn reconcile_all(
  hits: &[ProteinQueryRecord],
  model: &Model,
  config: &ProteinConfig,
  store: &mut ResultsStore,
  alert_log: &mut AlertLog,
) -> Result<(), Report> {
  let best = best_hit_per_feature(hits);

  for feature in &model.features {
    if feature.feature_type != FeatureType::CodingRegion || feature.is_duplicate() {
      continue;
    }
    let mut seq_names: std::collections::BTreeSet<String> = store
      .sequences_with_feature_result(feature.index)
      .map(str::to_owned)
      .collect();
    seq_names.extend(
      best
        .keys()
        .filter(|(_, idx)| *idx == feature.index)
        .map(|(seq, _)| seq.clone()),
    );
    for seq_name in &seq_names {
      let hit = best.get(&(seq_name.clone(), feature.index));
      reconcile_feature(seq_name, feature.index, hit, config, store, alert_log)?;
    }
  }

  for feature in &model.features {
    if feature.feature_type != FeatureType::CodingRegion {
      continue;
    }
    let mut seq_names: std::collections::BTreeSet<String> = store
      .sequences_with_feature_result(feature.index)
      .map(str::to_owned)
      .collect();
    seq_names.extend(
      best
        .keys()
        .filter(|(_, idx)| *idx == feature.index)
        .map(|(seq, _)| seq.clone()),
    );
    for seq_name in &seq_names {
      if PROPAGATING_CODES
        .iter()
        .any(|&code| alert_log.has_code_for_feature(seq_name, feature.index, code))
      {
        for &child_idx in &feature.child_feature_indices {
          if !alert_log.has_code_for_feature(seq_name, child_idx, AlertCode::ParentHasError) {
            alert_log.add(AlertCode::ParentHasError, target(seq_name, child_idx), "parent coding-region has a protein-level error")?;
          }
        }
      }
    }
  }
  Ok(())
}

fn reconcile_feature(
  seq_name: &str,
  feature_idx: usize,
  hit: Option<&ProteinQueryRecord>,
  config: &ProteinConfig,
  store: &mut ResultsStore,
  alert_log: &mut AlertLog,
) -> Result<(), Report> {
  let nucleotide: Option<FeatureResult> = store.feature_result(seq_name, feature_idx).copied();
  let has_nucleotide = nucleotide.is_some_and(|r| r.has_nucleotide_prediction());

  match (has_nucleotide, hit) {
    (false, None) => Ok(()),
    (false, Some(hit)) => {
      store.insert_feature_result(seq_name, feature_idx, FeatureResult::new(None, None, None, false, false));
      store.set_protein_fields(seq_name, feature_idx, hit)?;
      if hit.score >= config.lone_hit_min_score {
        alert_log.add(AlertCode::ProteinLoneHit, target(seq_name, feature_idx), format!("protein hit score {}", hit.score))?;
      }
      Ok(())
    }
    (true, None) => alert_log.add(AlertCode::NoProteinHit, target(seq_name, feature_idx), "no protein hit for this feature").map(|_| ()),
    (true, Some(hit)) => {
      store.set_protein_fields(seq_name, feature_idx, hit)?;
      let nucleotide = nucleotide.unwrap();
      if nucleotide.strand != Some(hit.strand) {
        alert_log.add(AlertCode::ConflictingStrand, target(seq_name, feature_idx), "protein hit strand disagrees with nucleotide prediction")?;
        return Ok(());
      }
      check_positional_agreement(seq_name, feature_idx, &nucleotide, hit, config, alert_log)?;
      if hit.max_insert > config.indel_tolerance_nt {
        alert_log.add(AlertCode::ProteinLongInsert, target(seq_name, feature_idx), format!("max insert {}", hit.max_insert))?;
      }
      if hit.max_delete > config.indel_tolerance_nt {
        alert_log.add(AlertCode::ProteinLongDelete, target(seq_name, feature_idx), format!("max delete {}", hit.max_delete))?;
      }
      if hit.has_internal_stop {
        alert_log.add(AlertCode::ProteinTranslationStop, target(seq_name, feature_idx), "protein alignment contains an internal stop")?;
      }
      Ok(())
    }
  }
}

fn check_positional_agreement(
  seq_name: &str,
  feature_idx: usize,
  nucleotide: &FeatureResult,
  hit: &ProteinQueryRecord,
  config: &ProteinConfig,
  alert_log: &mut AlertLog,
) -> Result<(), Report> {
  let Some(nt_start) = nucleotide.nucleotide_start else { return Ok(()) };
  let Some(nt_stop) = nucleotide.nucleotide_stop else { return Ok(()) };
  let effective_stop = nucleotide.corrected_stop.unwrap_or(nt_stop);
  let has_valid_stop = nucleotide.corrected_stop.is_none();

  if hit.is_full_sequence_query && hit.start < nt_start {
    alert_log.add(AlertCode::Protein5primeTooLong, target(seq_name, feature_idx), format!("protein start {} precedes nucleotide start {nt_start}", hit.start))?;
  } else if hit.start.abs_diff(nt_start) > config.alignment_tolerance_nt {
    alert_log.add(
      AlertCode::Protein5primeTooShort,
      target(seq_name, feature_idx),
      format!("protein start {} vs nucleotide start {nt_start}", hit.start),
    )?;
  }

  let three_prime_tolerance = config.alignment_tolerance_nt + if has_valid_stop { 3 } else { 0 };
  if hit.is_full_sequence_query && hit.stop > effective_stop {
    alert_log.add(AlertCode::Protein3primeTooLong, target(seq_name, feature_idx), format!("protein stop {} extends past nucleotide stop {effective_stop}", hit.stop))?;
  } else if hit.stop.abs_diff(effective_stop) > three_prime_tolerance {
    alert_log.add(
      AlertCode::Protein3primeTooShort,
      target(seq_name, feature_idx),
      format!("protein stop {} vs nucleotide stop {effective_stop}", hit.stop),
    )?;
  }
  Ok(())
}

#[cfg(test)]
mod reconciler_tests {
  use super::*;
  use crate::alert::AlertRegistry;
  use crate::model::{Feature, Segment};
  use crate::sequence::Strand;
  use crate::utils::range::Range;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn cds(index: usize, children: Vec<usize>) -> Feature {
    Feature {
      index,
      feature_type: FeatureType::CodingRegion,
      type_index: 1,
      product: None,
      gene: None,
      segments: vec![Segment {
        model_range: Range::from_one_based_inclusive(1, 900),
        strand: Strand::Plus,
        map_to_feature_index: index,
      }],
      parent_feature_idx: None,
      source_feature_idx: None,
      child_feature_indices: children,
    }
  }

  fn mat_peptide(index: usize, parent: usize) -> Feature {
    Feature {
      index,
      feature_type: FeatureType::MaturePeptide,
      type_index: 1,
      product: None,
      gene: None,
      segments: vec![Segment {
        model_range: Range::from_one_based_inclusive(1, 300),
        strand: Strand::Plus,
        map_to_feature_index: index,
      }],
      parent_feature_idx: Some(parent),
      source_feature_idx: None,
      child_feature_indices: vec![],
    }
  }

  fn model_with_children() -> Model {
    Model {
      name: "M".to_owned(),
      length: 900,
      group: None,
      subgroup: None,
      protein_db_path: None,
      cm_file: None,
      features: vec![cds(0, vec![1]), mat_peptide(1, 0)],
    }
  }

  fn protein_hit(seq_name: &str, feature_idx: usize, score: f64, start: usize, stop: usize, strand: Strand) -> ProteinQueryRecord {
    ProteinQueryRecord {
      seq_name: seq_name.to_owned(),
      feature_idx,
      score,
      start,
      stop,
      strand,
      max_insert: 0,
      max_delete: 0,
      has_internal_stop: false,
      is_full_sequence_query: true,
    }
  }

  #[rstest]
  fn no_protein_hit_fires_when_nucleotide_prediction_exists() -> Result<(), Report> {
    let model = model_with_children();
    let mut store = ResultsStore::new();
    store.insert_feature_result("s1", 0, FeatureResult::new(Some(1), Some(900), Some(Strand::Plus), false, false));
    let mut log = AlertLog::new(AlertRegistry::new());
    reconcile_all(&[], &model, &ProteinConfig::default(), &mut store, &mut log)?;
    assert!(log.has_code_for_feature("s1", 0, AlertCode::NoProteinHit));
    assert!(log.has_code_for_feature("s1", 1, AlertCode::ParentHasError));
    Ok(())
  }

  #[rstest]
  fn lone_hit_above_threshold_fires_and_below_threshold_is_silent() -> Result<(), Report> {
    let model = model_with_children();
    let mut store = ResultsStore::new();
    let hits = vec![protein_hit("s1", 0, 120.0, 1, 900, Strand::Plus), protein_hit("s2", 0, 10.0, 1, 900, Strand::Plus)];
    let mut log = AlertLog::new(AlertRegistry::new());
    reconcile_all(&hits, &model, &ProteinConfig::default(), &mut store, &mut log)?;
    assert!(log.has_code_for_feature("s1", 0, AlertCode::ProteinLoneHit));
    assert!(!log.has_code_for_feature("s2", 0, AlertCode::ProteinLoneHit));
    assert!(log.has_code_for_feature("s1", 1, AlertCode::ParentHasError));

    let lone_result = store.feature_result("s1", 0).expect("lone hit records a feature result from protein coordinates");
    assert!(!lone_result.has_nucleotide_prediction());
    assert_eq!(lone_result.protein_start, Some(1));
    assert_eq!(lone_result.protein_stop, Some(900));
    Ok(())
  }

  #[rstest]
  fn conflicting_strand_short_circuits_positional_checks() -> Result<(), Report> {
    let model = model_with_children();
    let mut store = ResultsStore::new();
    store.insert_feature_result("s1", 0, FeatureResult::new(Some(1), Some(900), Some(Strand::Plus), false, false));
    let hits = vec![protein_hit("s1", 0, 120.0, 1, 900, Strand::Minus)];
    let mut log = AlertLog::new(AlertRegistry::new());
    reconcile_all(&hits, &model, &ProteinConfig::default(), &mut store, &mut log)?;
    assert!(log.has_code_for_feature("s1", 0, AlertCode::ConflictingStrand));
    assert!(!log.has_code_for_feature("s1", 0, AlertCode::Protein5primeTooShort));
    Ok(())
  }

  #[rstest]
  fn five_prime_too_short_fires_beyond_tolerance() -> Result<(), Report> {
    let model = model_with_children();
    let mut store = ResultsStore::new();
    store.insert_feature_result("s1", 0, FeatureResult::new(Some(1), Some(900), Some(Strand::Plus), false, false));
    let hits = vec![protein_hit("s1", 0, 120.0, 10, 900, Strand::Plus)];
    let mut log = AlertLog::new(AlertRegistry::new());
    reconcile_all(&hits, &model, &ProteinConfig::default(), &mut store, &mut log)?;
    assert!(log.has_code_for_feature("s1", 0, AlertCode::Protein5primeTooShort));
    Ok(())
  }

  #[rstest]
  fn best_hit_per_feature_keeps_only_the_highest_score() {
    let hits = vec![protein_hit("s1", 0, 50.0, 1, 900, Strand::Plus), protein_hit("s1", 0, 90.0, 1, 900, Strand::Plus)];
    let best = best_hit_per_feature(&hits);
    assert_eq!(best.get(&("s1".to_owned(), 0)).unwrap().score, 90.0);
  }
}
