pub mod store;

pub use store::{
  ClassificationRecord, ClassificationResult, FeatureResult, HitInterval, ProteinQueryRecord, ResultsStore,
  SegmentResult,
};
