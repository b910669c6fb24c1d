use crate::align::AlignmentResult;
use crate::alert::{AlertCode, AlertLog, AlertTarget};
use crate::error::{ConfigError, PipelineError};
use crate::model::{Feature, Model};
use crate::results::{FeatureResult, ResultsStore, SegmentResult};
use crate::sequence::Strand;
use eyre::Report;

/// Maps a posterior-probability alignment-column character to a probability, or `None`
/// for a gap column (`.`). Any character outside `0-9,*,.` is a configuration error.
fn pp_char_to_probability(c: char) -> Result<Option<f64>, Report> {
  match c {
    '.' => Ok(None),
    '0' => Ok(Some(0.25)),
    '1'..='9' => Ok(Some(f64::from(c.to_digit(10).unwrap()) * 0.10)),
    '*' => Ok(Some(0.975)),
    other => Err(ConfigError::InvalidPosteriorProbabilityChar(other).into()),
  }
}

/// Per-model-position resolution: the sequence position to use when this model
/// position is reachable. `min_value` and `max_value` coincide for a plain matched
/// residue, but diverge when an insertion immediately follows it, extending how far
/// right `max_before` can reach from this position.
struct Resolved {
  min_value: usize,
  max_value: usize,
}

/// Converts one sequence's alignment into per-segment sequence coordinates and
/// boundary-quality metadata, for every feature of the model the sequence was aligned to.
pub struct CoordMapper {
  pub low_pp_threshold: f64,
}

impl Default for CoordMapper {
  fn default() -> Self {
    Self { low_pp_threshold: 0.8 }
  }
}

impl CoordMapper {
  pub fn new(low_pp_threshold: f64) -> Self {
    Self { low_pp_threshold }
  }

  pub fn map_alignment(
    &self,
    model: &Model,
    alignment: &AlignmentResult,
    seq_len: usize,
    store: &mut ResultsStore,
    alert_log: &mut AlertLog,
  ) -> Result<(), Report> {
    let model_pos_to_column = build_model_position_index(&alignment.reference_columns, model.length)?;
    let col_to_seq_pos = build_col_to_seq_pos(&alignment.aligned_bases);
    let resolved = resolve_per_position(model, alignment, &model_pos_to_column, &col_to_seq_pos);
    let total_residues = col_to_seq_pos.iter().filter(|p| p.is_some()).count();

    let (min_after_pos, min_after_val) = scan_min_after(&resolved, model.length);
    let (max_before_pos, max_before_val) = scan_max_before(&resolved, model.length);

    self.check_sanity(&alignment.seq_name, seq_len, &min_after_val, &max_before_val, model.length)?;

    for feature in &model.features {
      if feature.is_duplicate() {
        continue;
      }
      self.map_feature(
        feature,
        alignment,
        &model_pos_to_column,
        &min_after_pos,
        &min_after_val,
        &max_before_pos,
        &max_before_val,
        total_residues,
        store,
        alert_log,
      )?;
    }
    Ok(())
  }

  #[allow(clippy::too_many_arguments)]
  fn map_feature(
    &self,
    feature: &Feature,
    alignment: &AlignmentResult,
    model_pos_to_column: &[usize],
    min_after_pos: &[Option<usize>],
    min_after_val: &[Option<usize>],
    max_before_pos: &[Option<usize>],
    max_before_val: &[Option<usize>],
    total_residues: usize,
    store: &mut ResultsStore,
    alert_log: &mut AlertLog,
  ) -> Result<(), Report> {
    let mut any_hit = false;
    let mut outermost_five: Option<(usize, Strand)> = None;
    let mut outermost_three: Option<(usize, Strand)> = None;

    for (segment_idx, segment) in feature.segments.iter().enumerate() {
      let (model_start, model_stop) = segment.model_range.to_one_based_inclusive();

      let Some(seq_start) = min_after_val[model_start] else {
        continue;
      };
      let Some(seq_stop) = max_before_val[model_stop] else {
        continue;
      };
      any_hit = true;

      let five_flush = seq_start == 1;
      let three_flush = seq_stop == total_residues;
      let five_truncated = five_flush && min_after_pos[model_start] != Some(model_start);
      let three_truncated = three_flush && max_before_pos[model_stop] != Some(model_stop);

      let start_col = model_pos_to_column[model_start];
      let stop_col = model_pos_to_column[model_stop];
      let five_boundary_is_gap = alignment.aligned_bases[start_col].is_none();
      let three_boundary_is_gap = alignment.aligned_bases[stop_col].is_none();
      let five_boundary_pp = alignment.posterior_probs[start_col]
        .map(pp_char_to_probability)
        .transpose()?
        .flatten();
      let three_boundary_pp = alignment.posterior_probs[stop_col]
        .map(pp_char_to_probability)
        .transpose()?
        .flatten();

      store.insert_segment_result(
        &alignment.seq_name,
        feature.index,
        segment_idx,
        SegmentResult {
          seq_start,
          seq_stop,
          strand: segment.strand,
          five_flush,
          three_flush,
          five_truncated,
          three_truncated,
          five_boundary_is_gap,
          three_boundary_is_gap,
          five_boundary_pp,
          three_boundary_pp,
        },
      );

      let target_at = |feature_idx: usize| AlertTarget::Feature {
        seq_name: alignment.seq_name.clone(),
        feature_idx,
      };
      if !five_truncated && five_boundary_is_gap {
        alert_log.add(AlertCode::GapAt5primeBoundary, target_at(feature.index), "gap at 5' segment boundary")?;
      } else if !five_truncated && five_boundary_pp.is_some_and(|pp| pp < self.low_pp_threshold) {
        alert_log.add(
          AlertCode::LowPpAt5primeBoundary,
          target_at(feature.index),
          format!("pp {:.3} at 5' boundary", five_boundary_pp.unwrap()),
        )?;
      }
      if !three_truncated && three_boundary_is_gap {
        alert_log.add(AlertCode::GapAt3primeBoundary, target_at(feature.index), "gap at 3' segment boundary")?;
      } else if !three_truncated && three_boundary_pp.is_some_and(|pp| pp < self.low_pp_threshold) {
        alert_log.add(
          AlertCode::LowPpAt3primeBoundary,
          target_at(feature.index),
          format!("pp {:.3} at 3' boundary", three_boundary_pp.unwrap()),
        )?;
      }

      if let Some(five_idx) = feature.five_prime_most_segment_idx() {
        if five_idx == segment_idx {
          outermost_five = Some((seq_start, segment.strand));
        }
      }
      if let Some(three_idx) = feature.three_prime_most_segment_idx() {
        if three_idx == segment_idx {
          outermost_three = Some((seq_stop, segment.strand));
        }
      }
    }

    if !any_hit {
      return Ok(());
    }

    if let (Some((five_pos, strand)), Some((three_pos, _))) = (outermost_five, outermost_three) {
      let (nucleotide_start, nucleotide_stop) = match strand {
        Strand::Plus => (five_pos, three_pos),
        Strand::Minus => (three_pos, five_pos),
      };
      let segment_results: Vec<_> = store.segment_results_for_feature(&alignment.seq_name, feature.index).collect();
      let five_truncated = segment_results.iter().any(|(_, r)| r.five_truncated);
      let three_truncated = segment_results.iter().any(|(_, r)| r.three_truncated);
      store.insert_feature_result(
        &alignment.seq_name,
        feature.index,
        FeatureResult::new(
          Some(nucleotide_start),
          Some(nucleotide_stop),
          Some(strand),
          five_truncated,
          three_truncated,
        ),
      );
    }
    Ok(())
  }

  fn check_sanity(
    &self,
    seq_name: &str,
    seq_len: usize,
    min_after_val: &[Option<usize>],
    max_before_val: &[Option<usize>],
    model_length: usize,
  ) -> Result<(), Report> {
    if seq_len == 0 {
      return Ok(());
    }
    if max_before_val[model_length + 1] != Some(seq_len) {
      return Err(
        PipelineError::MapperInvariantViolated {
          sequence: seq_name.to_owned(),
          detail: format!(
            "left-to-right maximum sequence position {:?} does not equal sequence length {seq_len}",
            max_before_val[model_length + 1]
          ),
        }
        .into(),
      );
    }
    if min_after_val[0] != Some(1) {
      return Err(
        PipelineError::MapperInvariantViolated {
          sequence: seq_name.to_owned(),
          detail: format!("right-to-left minimum sequence position {:?} does not equal 1", min_after_val[0]),
        }
        .into(),
      );
    }
    Ok(())
  }
}

/// Maps each model position `1..=model_length` to its alignment column index, in order.
fn build_model_position_index(reference_columns: &[bool], model_length: usize) -> Result<Vec<usize>, Report> {
  let mut index = vec![0usize; model_length + 1];
  let mut model_pos = 0usize;
  for (col, &is_reference) in reference_columns.iter().enumerate() {
    if is_reference {
      model_pos += 1;
      if model_pos <= model_length {
        index[model_pos] = col;
      }
    }
  }
  if model_pos != model_length {
    return Err(PipelineError::MapperInvariantViolated {
      sequence: String::new(),
      detail: format!("alignment has {model_pos} reference columns, model length is {model_length}"),
    }
    .into());
  }
  Ok(index)
}

/// Maps each alignment column to the 1-based position of the residue it carries in the
/// unaligned sequence, by cumulative count of non-gap columns. Gap columns map to `None`.
fn build_col_to_seq_pos(aligned_bases: &[Option<u8>]) -> Vec<Option<usize>> {
  let mut next_pos = 1usize;
  aligned_bases
    .iter()
    .map(|base| {
      base.map(|_| {
        let pos = next_pos;
        next_pos += 1;
        pos
      })
    })
    .collect()
}

fn resolve_per_position(
  model: &Model,
  alignment: &AlignmentResult,
  model_pos_to_column: &[usize],
  col_to_seq_pos: &[Option<usize>],
) -> Vec<Option<Resolved>> {
  let _ = model;
  let mut inserts_after: std::collections::HashMap<usize, (usize, usize)> = std::collections::HashMap::new();
  for insert in &alignment.inserts {
    let entry = inserts_after
      .entry(insert.model_pos_before)
      .or_insert((insert.seq_start, insert.seq_start + insert.len - 1));
    entry.0 = entry.0.min(insert.seq_start);
    entry.1 = entry.1.max(insert.seq_start + insert.len - 1);
  }

  let model_length = model_pos_to_column.len().saturating_sub(1);
  let mut resolved = vec![None; model_length + 1];

  // A 5' overhang insert (bases before the first model column ever matches) is anchored
  // at model-position-before 0, which `1..=model_length` below never visits.
  if let Some(&(lo, hi)) = inserts_after.get(&0) {
    resolved[0] = Some(Resolved { min_value: lo, max_value: hi });
  }

  for model_pos in 1..=model_length {
    let col = model_pos_to_column[model_pos];
    let insert_after = inserts_after.get(&model_pos).copied();
    if let Some(seq_pos) = col_to_seq_pos.get(col).copied().flatten() {
      // A matched residue can still be followed by an insert (e.g. a 3' overhang
      // anchored at the final model position); extend the reachable right edge to it.
      let max_value = insert_after.map_or(seq_pos, |(_, hi)| seq_pos.max(hi));
      resolved[model_pos] = Some(Resolved { min_value: seq_pos, max_value });
    } else if let Some((lo, hi)) = insert_after {
      resolved[model_pos] = Some(Resolved { min_value: lo, max_value: hi });
    }
  }
  resolved
}

fn scan_min_after(resolved: &[Option<Resolved>], model_length: usize) -> (Vec<Option<usize>>, Vec<Option<usize>>) {
  let mut pos = vec![None; model_length + 2];
  let mut val = vec![None; model_length + 2];
  for r in (0..=model_length).rev() {
    if let Some(Resolved { min_value, .. }) = resolved.get(r).and_then(|o| o.as_ref()) {
      pos[r] = Some(r);
      val[r] = Some(*min_value);
    } else {
      pos[r] = pos[r + 1];
      val[r] = val[r + 1];
    }
  }
  (pos, val)
}

fn scan_max_before(resolved: &[Option<Resolved>], model_length: usize) -> (Vec<Option<usize>>, Vec<Option<usize>>) {
  let mut pos = vec![None; model_length + 2];
  let mut val = vec![None; model_length + 2];
  for r in 1..=(model_length + 1) {
    if let Some(Resolved { max_value, .. }) = resolved.get(r).and_then(|o| o.as_ref()) {
      pos[r] = Some(r);
      val[r] = Some(*max_value);
    } else {
      pos[r] = pos[r - 1];
      val[r] = val[r - 1];
    }
  }
  (pos, val)
}
