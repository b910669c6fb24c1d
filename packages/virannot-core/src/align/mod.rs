pub mod config;
pub mod driver;
pub mod engine;

pub use config::AlignmentConfig;
pub use driver::AlignerDriver;
pub use engine::{AlignEngine, AlignOutcome, AlignmentResult, InsertRecord};
