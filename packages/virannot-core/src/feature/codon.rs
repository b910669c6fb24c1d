/// Canonical DNA start/stop codons. Matching is case-insensitive and ignores the
/// distinction between T and U, so callers don't need to normalize RNA input first.
const STANDARD_START_CODONS: &[[u8; 3]] = &[*b"ATG"];

const STANDARD_STOP_CODONS: &[[u8; 3]] = &[*b"TAA", *b"TAG", *b"TGA"];

fn normalize(codon: &[u8]) -> Option<[u8; 3]> {
  if codon.len() != 3 {
    return None;
  }
  let mut out = [0u8; 3];
  for (i, &b) in codon.iter().enumerate() {
    out[i] = match b.to_ascii_uppercase() {
      b'U' => b'T',
      other => other,
    };
  }
  Some(out)
}

/// Whether `codon` is a valid start codon, given zero or more feature-configured
/// alternative start codons (in addition to the standard ATG).
pub fn is_start_codon(codon: &[u8], alternative_starts: &[[u8; 3]]) -> bool {
  let Some(normalized) = normalize(codon) else { return false };
  STANDARD_START_CODONS.contains(&normalized) || alternative_starts.contains(&normalized)
}

pub fn is_stop_codon(codon: &[u8]) -> bool {
  let Some(normalized) = normalize(codon) else { return false };
  STANDARD_STOP_CODONS.contains(&normalized)
}

/// Scans `bases` in-frame (windows of 3, starting at offset 0) for the first stop codon,
/// returning its 0-based offset into `bases` if found.
pub fn first_inframe_stop(bases: &[u8]) -> Option<usize> {
  bases.chunks_exact(3).enumerate().find_map(|(i, chunk)| is_stop_codon(chunk).then_some(i * 3))
}

#[cfg(test)]
mod codon_tests {
  use super::*;
  use rstest::rstest;

  #[rstest]
  fn recognizes_standard_start_and_stop() {
    assert!(is_start_codon(b"ATG", &[]));
    assert!(!is_start_codon(b"ATC", &[]));
    assert!(is_stop_codon(b"TAA"));
    assert!(is_stop_codon(b"TAG"));
    assert!(is_stop_codon(b"TGA"));
    assert!(!is_stop_codon(b"AAA"));
  }

  #[rstest]
  fn honors_configured_alternative_start() {
    assert!(!is_start_codon(b"CTG", &[]));
    assert!(is_start_codon(b"CTG", &[*b"CTG"]));
  }

  #[rstest]
  fn treats_u_as_t() {
    assert!(is_stop_codon(b"UAA"));
  }

  #[rstest]
  fn finds_first_inframe_stop() {
    let bases = b"ATGAAAAAATAAGGG";
    assert_eq!(first_inframe_stop(bases), Some(9));
  }

  #[rstest]
  fn no_inframe_stop_returns_none() {
    assert_eq!(first_inframe_stop(b"ATGAAAAAACCC"), None);
  }
}
