pub mod engine;
pub mod orchestrator;

pub use engine::{SearchEngine, SearchHit};
pub use orchestrator::{classify_pass1, classify_pass2, ParallelismPolicy, SearchOrchestrator};
