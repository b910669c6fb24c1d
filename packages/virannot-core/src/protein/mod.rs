pub mod config;
pub mod engine;
pub mod reconciler;

pub use config::ProteinConfig;
pub use engine::{ProteinAligner, ProteinQuery};
pub use reconciler::reconcile_all;
