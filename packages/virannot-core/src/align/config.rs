/// Tuning for the Aligner Driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentConfig {
  pub max_matrix_mb: f64,
  pub min_pp: f64,
  pub initial_tau: f64,
  pub fixed_tau: bool,
  pub sub_alignment: bool,
  pub local_alignment: bool,
}

impl Default for AlignmentConfig {
  fn default() -> Self {
    Self {
      max_matrix_mb: 8192.0,
      min_pp: 0.8,
      initial_tau: 1e-3,
      fixed_tau: false,
      sub_alignment: false,
      local_alignment: false,
    }
  }
}
