pub mod metadata;

pub use metadata::{Feature, FeatureType, Model, ModelLibrary, Segment};
