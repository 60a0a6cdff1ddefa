pub mod analysis;
#[cfg(feature = "desktop")]
pub mod camera;
pub mod cheat;
pub mod config;
pub mod counter;
pub mod error;
pub mod job;
pub mod pose;
pub mod preview;
pub mod sampler;

pub use analysis::{AnalysisResult, Analyzer, SequenceAnalyzer};
pub use counter::ExerciseKind;
pub use error::AnalysisError;
