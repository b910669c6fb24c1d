pub mod classifier;
pub mod config;

pub use classifier::Classifier;
pub use config::ClassificationThresholds;
