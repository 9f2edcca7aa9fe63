pub mod config;
pub mod coordinator;
pub mod error;

pub use config::{MediaLimits, PipelineConfig};
pub use coordinator::{AssessmentCoordinator, AudioOutcome, HandwritingOutcome, RiskOutcome};
pub use error::PipelineError;
