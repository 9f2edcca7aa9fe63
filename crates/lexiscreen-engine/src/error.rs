use lexiscreen_core::ids::UserId;
use lexiscreen_core::questionnaire::ValidationError;
use lexiscreen_core::record::Role;
use lexiscreen_inference::InferenceError;
use lexiscreen_media::MediaError;
use lexiscreen_store::StoreError;

/// Pipeline-level error taxonomy. Lower layers raise typed errors; the
/// coordinator adds request context without re-wrapping, and `kind()` gives
/// callers a machine-readable class alongside the human-readable message.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("user not found: {0}")]
    UserNotFound(UserId),

    #[error("user {user_id} has role {role}; assessment records belong to students")]
    NotAStudent { user_id: UserId, role: Role },

    #[error("assessment state invalid: {0}")]
    InvalidState(String),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Machine-readable error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::NotAStudent { .. } => "validation_error",
            Self::UserNotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::Media(_) => "media_conversion_error",
            Self::Inference(_) => "inference_service_error",
            Self::Store(_) => "storage_error",
        }
    }
}
