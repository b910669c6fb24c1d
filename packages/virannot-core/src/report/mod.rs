pub mod reporter;

pub use reporter::{FeatureRow, PipelineReport, Reporter, SeqRow};
