use crate::alert::{AlertCode, AlertInstance, AlertLog};
use crate::model::{FeatureType, Model, ModelLibrary};
use crate::results::{FeatureResult, ResultsStore};
use eyre::Report;

/// Feature-level alerts whose presence alone does not downgrade the feature's declared
/// type in the feature table; only these "boundary quality" codes trigger the
/// `misc_feature` downgrade when they are the *only* alerts present on a feature.
const BOUNDARY_QUALITY_CODES: &[AlertCode] = &[
  AlertCode::GapAt5primeBoundary,
  AlertCode::GapAt3primeBoundary,
  AlertCode::LowPpAt5primeBoundary,
  AlertCode::LowPpAt3primeBoundary,
];

/// One row of the per-sequence tabular summary (`*.seq.tab`).
#[derive(Debug, Clone, PartialEq)]
pub struct SeqRow {
  pub seq_name: String,
  pub model: Option<String>,
  pub annotated_features: usize,
  pub truncated_features: usize,
  pub alert_codes: Vec<AlertCode>,
  pub passed: bool,
}

/// One row of the per-feature tabular summary (`*.ftr.tab`).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
  pub seq_name: String,
  pub feature_idx: usize,
  pub feature_type: FeatureType,
  pub product: Option<String>,
  pub coords: String,
  pub five_truncated: bool,
  pub three_truncated: bool,
  pub alert_codes: Vec<AlertCode>,
}

impl FeatureRow {
  /// The type recorded in feature tables: `misc_feature` when every alert on this
  /// feature is a boundary-quality alert (and at least one is present), the feature's
  /// declared type otherwise.
  pub fn reported_type(&self) -> &'static str {
    if !self.alert_codes.is_empty() && self.alert_codes.iter().all(|c| BOUNDARY_QUALITY_CODES.contains(c)) {
      "misc_feature"
    } else {
      match self.feature_type {
        FeatureType::CodingRegion => "CDS",
        FeatureType::MaturePeptide => "mat_peptide",
        FeatureType::Gene => "gene",
        FeatureType::Other => "misc_feature",
      }
    }
  }
}

/// The full set of Reporter outputs for one pipeline run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineReport {
  pub seq_rows: Vec<SeqRow>,
  pub feature_rows: Vec<FeatureRow>,
  pub passing_seqlist: Vec<String>,
  pub failing_seqlist: Vec<String>,
  pub ap_sqtable: String,
  pub af_sqtable: String,
  pub long_sqtable: String,
  pub altlist: String,
}

/// Flattens the Results Store and Alert Log into tabular summaries, feature tables
/// and sequence lists, applying the PASS/FAIL decision rule.
pub struct Reporter;

impl Reporter {
  pub fn new() -> Self {
    Self
  }

  pub fn report(&self, library: &ModelLibrary, sequence_names: &[String], store: &ResultsStore, alert_log: &AlertLog) -> Result<PipelineReport, Report> {
    let mut report = PipelineReport::default();

    for seq_name in sequence_names {
      let model = store.assigned_model(seq_name).and_then(|name| library.get(name));
      let feature_results: Vec<(usize, &FeatureResult)> = store.feature_results_for_sequence(seq_name).collect();
      let annotated = feature_results.iter().filter(|(_, r)| r.is_annotated()).count();
      let truncated = feature_results.iter().filter(|(_, r)| r.five_truncated || r.three_truncated).count();

      let sequence_alerts: Vec<AlertCode> = alert_log.sequence_level_for(seq_name).map(|a| a.code).collect();
      let feature_alerts: Vec<AlertCode> = alert_log.feature_level_for(seq_name).map(|a| a.code).collect();
      let mut all_codes = sequence_alerts.clone();
      all_codes.extend(feature_alerts.iter().copied());

      let passed = annotated > 0 && sequence_alerts.is_empty() && feature_alerts.is_empty();

      report.seq_rows.push(SeqRow {
        seq_name: seq_name.clone(),
        model: model.map(|m| m.name.clone()),
        annotated_features: annotated,
        truncated_features: truncated,
        alert_codes: all_codes,
        passed,
      });

      if passed {
        report.passing_seqlist.push(seq_name.clone());
      } else {
        report.failing_seqlist.push(seq_name.clone());
      }

      if let Some(model) = model {
        for (feature_idx, result) in &feature_results {
          if !result.is_annotated() {
            continue;
          }
          let Some(feature) = model.feature(*feature_idx) else { continue };
          let alerts: Vec<AlertCode> = alert_log.for_feature(seq_name, *feature_idx).map(|a| a.code).collect();
          report.feature_rows.push(FeatureRow {
            seq_name: seq_name.clone(),
            feature_idx: *feature_idx,
            feature_type: feature.feature_type,
            product: feature.product.clone(),
            coords: format_coords(result, feature_alert_carrots(*result)),
            five_truncated: result.five_truncated,
            three_truncated: result.three_truncated,
            alert_codes: alerts,
          });
        }
      }
    }

    report.ap_sqtable = render_ap_sqtable(&report);
    report.af_sqtable = render_af_sqtable(&report, alert_log);
    report.long_sqtable = render_long_sqtable(&report, alert_log);
    report.altlist = render_altlist(alert_log);

    Ok(report)
  }
}

impl Default for Reporter {
  fn default() -> Self {
    Self::new()
  }
}

fn feature_alert_carrots(result: FeatureResult) -> (bool, bool) {
  (result.five_truncated, result.three_truncated)
}

fn format_coords(result: &FeatureResult, (five_truncated, three_truncated): (bool, bool)) -> String {
  if !result.has_nucleotide_prediction() {
    let start = result.protein_start.unwrap_or(0);
    let stop = result.protein_stop.unwrap_or(0);
    return format!("{start}..{stop}");
  }
  let start = result.nucleotide_start.unwrap_or(0);
  let stop = result.corrected_stop.or(result.nucleotide_stop).unwrap_or(0);
  let start_str = if five_truncated { format!("<{start}") } else { start.to_string() };
  let stop_str = if three_truncated {
    format!(">{stop}")
  } else if result.corrected_stop.is_none() && result.nucleotide_stop.is_none() {
    "?".to_owned()
  } else {
    stop.to_string()
  };
  format!("{start_str}..{stop_str}")
}

/// The feature table for passing sequences: only clean (alert-free) features.
fn render_ap_sqtable(report: &PipelineReport) -> String {
  let mut out = String::new();
  for row in &report.seq_rows {
    if !row.passed {
      continue;
    }
    out.push_str(&format!(">Feature {}\n", row.seq_name));
    for feature in report.feature_rows.iter().filter(|f| f.seq_name == row.seq_name && f.alert_codes.is_empty()) {
      out.push_str(&format!("{}\t{}\n", feature.coords, feature.reported_type()));
    }
  }
  out
}

/// The feature table for failing sequences: the features it *would* emit, plus a
/// trailing block of `ERROR:` lines, one per alert.
fn render_af_sqtable(report: &PipelineReport, alert_log: &AlertLog) -> String {
  let mut out = String::new();
  for row in &report.seq_rows {
    if row.passed {
      continue;
    }
    out.push_str(&format!(">Feature {}\n", row.seq_name));
    for feature in report.feature_rows.iter().filter(|f| f.seq_name == row.seq_name) {
      out.push_str(&format!("{}\t{}\n", feature.coords, feature.reported_type()));
    }
    for alert in alert_log.for_sequence(&row.seq_name) {
      out.push_str(&format!("ERROR: {}\n", render_alert_line(alert)));
    }
  }
  out
}

/// Every sequence, all alerts embedded as notes.
fn render_long_sqtable(report: &PipelineReport, alert_log: &AlertLog) -> String {
  let mut out = String::new();
  for row in &report.seq_rows {
    out.push_str(&format!(">Feature {}\n", row.seq_name));
    for feature in report.feature_rows.iter().filter(|f| f.seq_name == row.seq_name) {
      out.push_str(&format!("{}\t{}\n", feature.coords, feature.reported_type()));
      for alert in alert_log.for_feature(&row.seq_name, feature.feature_idx) {
        out.push_str(&format!("\tnote\t{}\n", render_alert_line(alert)));
      }
    }
    for alert in alert_log.sequence_level_for(&row.seq_name) {
      out.push_str(&format!("\tnote\t{}\n", render_alert_line(alert)));
    }
  }
  out
}

fn render_altlist(alert_log: &AlertLog) -> String {
  let mut out = String::new();
  for alert in alert_log.all() {
    out.push_str(&format!("{}\n", render_alert_line(alert)));
  }
  out
}

fn render_alert_line(alert: &AlertInstance) -> String {
  format!("{} {:?}: {}", alert.code, alert.target, alert.detail)
}

#[cfg(test)]
mod reporter_tests {
  use super::*;
  use crate::alert::AlertRegistry;
  use crate::alert::AlertTarget;
  use crate::model::{Feature, Segment};
  use crate::sequence::Strand;
  use crate::utils::range::Range;
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use std::collections::BTreeMap;

  fn model_with_cds() -> Model {
    Model {
      name: "M".to_owned(),
      length: 900,
      group: None,
      subgroup: None,
      protein_db_path: None,
      cm_file: None,
      features: vec![Feature {
        index: 0,
        feature_type: FeatureType::CodingRegion,
        type_index: 1,
        product: Some("polyprotein".to_owned()),
        gene: None,
        segments: vec![Segment {
          model_range: Range::from_one_based_inclusive(1, 900),
          strand: Strand::Plus,
          map_to_feature_index: 0,
        }],
        parent_feature_idx: None,
        source_feature_idx: None,
        child_feature_indices: vec![],
      }],
    }
  }

  fn library_with(model: Model) -> ModelLibrary {
    ModelLibrary {
      models: BTreeMap::from([(model.name.clone(), model)]),
    }
  }

  #[rstest]
  fn clean_sequence_passes_and_emits_untruncated_coords() -> Result<(), Report> {
    let library = library_with(model_with_cds());
    let mut store = ResultsStore::new();
    store.assign_model("s1", "M");
    store.insert_feature_result("s1", 0, FeatureResult::new(Some(1), Some(900), Some(Strand::Plus), false, false));
    let log = AlertLog::new(AlertRegistry::new());

    let report = Reporter::new().report(&library, &["s1".to_owned()], &store, &log)?;
    assert_eq!(report.passing_seqlist, vec!["s1".to_owned()]);
    assert!(report.failing_seqlist.is_empty());
    let feature = &report.feature_rows[0];
    assert_eq!(feature.coords, "1..900");
    assert_eq!(feature.reported_type(), "CDS");
    assert!(report.ap_sqtable.contains("1..900\tCDS"));
    Ok(())
  }

  #[rstest]
  fn feature_level_alert_fails_the_sequence_and_appears_in_af_sqtable() -> Result<(), Report> {
    let library = library_with(model_with_cds());
    let mut store = ResultsStore::new();
    store.assign_model("s1", "M");
    store.insert_feature_result("s1", 0, FeatureResult::new(Some(1), Some(303), Some(Strand::Plus), false, false));
    store.set_corrected_stop("s1", 0, Some(303))?;
    let mut log = AlertLog::new(AlertRegistry::new());
    log.add(
      AlertCode::EarlyStop,
      AlertTarget::Feature {
        seq_name: "s1".to_owned(),
        feature_idx: 0,
      },
      "in-frame stop at offset 297",
    )?;

    let report = Reporter::new().report(&library, &["s1".to_owned()], &store, &log)?;
    assert_eq!(report.failing_seqlist, vec!["s1".to_owned()]);
    assert!(report.af_sqtable.contains("1..303"));
    assert!(report.af_sqtable.contains("ERROR:"));
    Ok(())
  }

  #[rstest]
  fn only_boundary_alert_downgrades_feature_to_misc_feature() -> Result<(), Report> {
    let library = library_with(model_with_cds());
    let mut store = ResultsStore::new();
    store.assign_model("s1", "M");
    store.insert_feature_result("s1", 0, FeatureResult::new(Some(1), Some(900), Some(Strand::Plus), false, false));
    let mut log = AlertLog::new(AlertRegistry::new());
    log.add(
      AlertCode::LowPpAt5primeBoundary,
      AlertTarget::Feature {
        seq_name: "s1".to_owned(),
        feature_idx: 0,
      },
      "pp 0.5 at 5' boundary",
    )?;

    let report = Reporter::new().report(&library, &["s1".to_owned()], &store, &log)?;
    let feature = &report.feature_rows[0];
    assert_eq!(feature.reported_type(), "misc_feature");
    Ok(())
  }

  #[rstest]
  fn five_truncated_feature_gets_a_carrot_start() -> Result<(), Report> {
    let library = library_with(model_with_cds());
    let mut store = ResultsStore::new();
    store.assign_model("s1", "M");
    store.insert_feature_result("s1", 0, FeatureResult::new(Some(1), Some(880), Some(Strand::Plus), true, false));
    let log = AlertLog::new(AlertRegistry::new());

    let report = Reporter::new().report(&library, &["s1".to_owned()], &store, &log)?;
    assert_eq!(report.feature_rows[0].coords, "<1..880");
    Ok(())
  }

  #[rstest]
  fn zero_features_annotated_fails_with_empty_feature_table() -> Result<(), Report> {
    let library = library_with(model_with_cds());
    let store = ResultsStore::new();
    let log = AlertLog::new(AlertRegistry::new());

    let report = Reporter::new().report(&library, &["s1".to_owned()], &store, &log)?;
    assert_eq!(report.failing_seqlist, vec!["s1".to_owned()]);
    assert!(report.feature_rows.is_empty());
    Ok(())
  }
}
