use std::time::Duration;

/// Typed errors for inference-service calls.
///
/// Distinguishes "service said no" ([`InferenceError::ServiceError`], which
/// preserves the structured error body) from "service unreachable"
/// ([`InferenceError::Unreachable`] / [`InferenceError::Timeout`]). The
/// client applies no fallbacks; recovery policy belongs to the caller.
#[derive(Clone, Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("inference service returned {status}: {body}")]
    ServiceError { status: u16, body: String },

    #[error("inference service unreachable: {0}")]
    Unreachable(String),

    #[error("inference request timed out after {0:?}")]
    Timeout(Duration),

    #[error("inference service returned an unparseable body: {0}")]
    MalformedResponse(String),

    #[error("invalid media metadata: {0}")]
    InvalidPayload(String),
}

impl InferenceError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::ServiceError { .. } => "service_error",
            Self::Unreachable(_) => "unreachable",
            Self::Timeout(_) => "timeout",
            Self::MalformedResponse(_) => "malformed_response",
            Self::InvalidPayload(_) => "invalid_payload",
        }
    }

    /// True when the service itself rejected the request (as opposed to a
    /// transport-level failure).
    pub fn is_service_rejection(&self) -> bool {
        matches!(self, Self::ServiceError { .. })
    }

    pub(crate) fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Unreachable(e.to_string())
        }
    }
}
