pub mod builder;
pub mod cds;
pub mod codon;

pub use builder::{assemble_feature, downstream_window, AssembledFeature};
pub use cds::{evaluate_model_features, CdsConfig};
