pub mod ids;
pub mod questionnaire;
pub mod record;
pub mod risk;

pub use ids::UserId;
pub use questionnaire::{Questionnaire, ValidationError};
pub use record::{AdaptiveLearning, AssessmentRecord, AudioAnalysis, HandwritingScore, Role};
pub use risk::{assess, RiskBreakdown, QUESTION_WEIGHTS};
