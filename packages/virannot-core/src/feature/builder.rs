use crate::model::Feature;
use crate::results::ResultsStore;
use crate::sequence::{reverse_complement, Sequence, Strand};

/// A feature's assembled nucleotide string, paired with the original (input-sequence,
/// 1-based) position each base came from, in the same 5'-to-3' reading order. The CDS
/// state machine uses `positions` to translate an in-frame-stop offset back into a
/// sequence coordinate for `corrected_stop`.
pub struct AssembledFeature {
  pub nucleotides: Vec<u8>,
  pub positions: Vec<usize>,
}

/// Concatenates a feature's segment substrings (reverse-complementing minus-strand
/// segments) into its nucleotide string, reading segments in 5'-to-3' order.
///
/// Returns `None` if any segment has no `SegmentResult` recorded (no hit for that
/// segment), since a feature's nucleotide string is only meaningful when every one of
/// its segments was mapped.
pub fn assemble_feature(feature: &Feature, sequence: &Sequence, store: &ResultsStore) -> Option<AssembledFeature> {
  let strand = feature.strand()?;
  let mut ordered: Vec<usize> = (0..feature.segments.len()).collect();
  match strand {
    Strand::Plus => ordered.sort_by_key(|&i| feature.segments[i].model_range.begin),
    Strand::Minus => ordered.sort_by_key(|&i| std::cmp::Reverse(feature.segments[i].model_range.begin)),
  }

  let mut nucleotides = Vec::new();
  let mut positions = Vec::new();
  for segment_idx in ordered {
    let result = store.segment_result(&sequence.name, feature.index, segment_idx)?;
    let slice = sequence.bases.get(result.seq_start.checked_sub(1)?..result.seq_stop)?;
    match strand {
      Strand::Plus => {
        nucleotides.extend_from_slice(slice);
        positions.extend(result.seq_start..=result.seq_stop);
      }
      Strand::Minus => {
        nucleotides.extend(reverse_complement(slice));
        positions.extend((result.seq_start..=result.seq_stop).rev());
      }
    }
  }
  Some(AssembledFeature { nucleotides, positions })
}

/// The oriented nucleotide window immediately 3' of a feature's predicted stop, out to
/// the end of the input sequence, used by the extended-stop search. Paired with the
/// sequence position of each base, same convention as `assemble_feature`.
pub fn downstream_window(feature: &Feature, sequence: &Sequence, store: &ResultsStore) -> Option<AssembledFeature> {
  let strand = feature.strand()?;
  let three_idx = feature.three_prime_most_segment_idx()?;
  let result = store.segment_result(&sequence.name, feature.index, three_idx)?;
  match strand {
    Strand::Plus => {
      let start = result.seq_stop;
      let slice = sequence.bases.get(start..)?;
      let positions = (start + 1..=sequence.bases.len()).collect();
      Some(AssembledFeature {
        nucleotides: slice.to_vec(),
        positions,
      })
    }
    Strand::Minus => {
      let end_excl = result.seq_start.checked_sub(1)?;
      let slice = sequence.bases.get(..end_excl)?;
      let positions = (1..=end_excl).rev().collect();
      Some(AssembledFeature {
        nucleotides: reverse_complement(slice),
        positions,
      })
    }
  }
}

#[cfg(test)]
mod builder_tests {
  use super::*;
  use crate::model::{FeatureType, Segment};
  use crate::results::SegmentResult;
  use crate::utils::range::Range;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn segment_result(seq_start: usize, seq_stop: usize, strand: Strand) -> SegmentResult {
    SegmentResult {
      seq_start,
      seq_stop,
      strand,
      five_flush: true,
      three_flush: true,
      five_truncated: false,
      three_truncated: false,
      five_boundary_is_gap: false,
      three_boundary_is_gap: false,
      five_boundary_pp: Some(0.975),
      three_boundary_pp: Some(0.975),
    }
  }

  fn feature_with_two_segments(strand: Strand) -> Feature {
    Feature {
      index: 0,
      feature_type: FeatureType::CodingRegion,
      type_index: 1,
      product: None,
      gene: None,
      segments: vec![
        Segment {
          model_range: Range::from_one_based_inclusive(1, 10),
          strand,
          map_to_feature_index: 0,
        },
        Segment {
          model_range: Range::from_one_based_inclusive(11, 20),
          strand,
          map_to_feature_index: 0,
        },
      ],
      parent_feature_idx: None,
      source_feature_idx: None,
      child_feature_indices: vec![],
    }
  }

  #[rstest]
  fn concatenates_plus_strand_segments_in_model_order() {
    let sequence = Sequence::new("s1", b"AAAAAAAAAACCCCCCCCCC".to_vec());
    let feature = feature_with_two_segments(Strand::Plus);
    let mut store = ResultsStore::new();
    store.insert_segment_result("s1", 0, 0, segment_result(1, 10, Strand::Plus));
    store.insert_segment_result("s1", 0, 1, segment_result(11, 20, Strand::Plus));

    let assembled = assemble_feature(&feature, &sequence, &store).unwrap();
    assert_eq!(assembled.nucleotides, b"AAAAAAAAAACCCCCCCCCC");
    assert_eq!(assembled.positions, (1..=20).collect::<Vec<_>>());
  }

  #[rstest]
  fn reverse_complements_and_reverses_segment_order_on_minus_strand() {
    let sequence = Sequence::new("s1", b"AAAAAAAAAACCCCCCCCCC".to_vec());
    let feature = feature_with_two_segments(Strand::Minus);
    let mut store = ResultsStore::new();
    store.insert_segment_result("s1", 0, 0, segment_result(1, 10, Strand::Minus));
    store.insert_segment_result("s1", 0, 1, segment_result(11, 20, Strand::Minus));

    let assembled = assemble_feature(&feature, &sequence, &store).unwrap();
    // Read 3'->5' on the model means the higher-model-range segment comes first.
    assert_eq!(assembled.nucleotides, b"GGGGGGGGGGTTTTTTTTTT");
    assert_eq!(assembled.positions[0], 20);
    assert_eq!(assembled.positions[19], 1);
  }

  #[rstest]
  fn missing_segment_result_yields_none() {
    let sequence = Sequence::new("s1", b"AAAAAAAAAACCCCCCCCCC".to_vec());
    let feature = feature_with_two_segments(Strand::Plus);
    let mut store = ResultsStore::new();
    store.insert_segment_result("s1", 0, 0, segment_result(1, 10, Strand::Plus));
    assert!(assemble_feature(&feature, &sequence, &store).is_none());
  }

  #[rstest]
  fn downstream_window_on_plus_strand_runs_to_sequence_end() {
    let sequence = Sequence::new("s1", b"ATGAAACCCTAAGGGGGG".to_vec());
    let feature = Feature {
      index: 0,
      feature_type: FeatureType::CodingRegion,
      type_index: 1,
      product: None,
      gene: None,
      segments: vec![Segment {
        model_range: Range::from_one_based_inclusive(1, 9),
        strand: Strand::Plus,
        map_to_feature_index: 0,
      }],
      parent_feature_idx: None,
      source_feature_idx: None,
      child_feature_indices: vec![],
    };
    let mut store = ResultsStore::new();
    store.insert_segment_result("s1", 0, 0, segment_result(1, 9, Strand::Plus));
    let window = downstream_window(&feature, &sequence, &store).unwrap();
    assert_eq!(window.nucleotides, b"CTAAGGGGGG");
    assert_eq!(window.positions[0], 10);
  }
}
