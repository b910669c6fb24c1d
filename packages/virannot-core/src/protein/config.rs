/// Tuning for the Protein Reconciler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProteinConfig {
  pub alignment_tolerance_nt: usize,
  pub indel_tolerance_nt: usize,
  pub lone_hit_min_score: f64,
}

impl Default for ProteinConfig {
  fn default() -> Self {
    Self {
      alignment_tolerance_nt: 5,
      indel_tolerance_nt: 27,
      lone_hit_min_score: 80.0,
    }
  }
}
