use bytes::Bytes;
use serde::{Deserialize, Serialize};

use lexiscreen_core::record::AudioAnalysis;

/// An uploaded handwriting sample plus the metadata the service wants
/// alongside the bytes.
#[derive(Clone, Debug)]
pub struct ImagePayload {
    pub bytes: Bytes,
    pub filename: String,
    pub content_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Bytes, filename: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
            content_type: content_type.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Easy => write!(f, "easy"),
            Self::Medium => write!(f, "medium"),
            Self::Hard => write!(f, "hard"),
        }
    }
}

/// Side-channel context describing the expected utterance, serialized as the
/// JSON `data` field of the audio request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioContext {
    pub test_type: String,
    pub expected_text: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl AudioContext {
    pub fn new(
        test_type: impl Into<String>,
        expected_text: impl Into<String>,
        difficulty: Difficulty,
    ) -> Self {
        Self {
            test_type: test_type.into(),
            expected_text: expected_text.into(),
            difficulty,
        }
    }
}

/// Wire response of `POST /handwriting`.
#[derive(Debug, Deserialize)]
pub(crate) struct HandwritingResponse {
    pub score: i64,
}

/// Nested `analysis` object of the audio response; required metrics plus
/// whatever else the service reports.
#[derive(Debug, Deserialize)]
pub(crate) struct AnalysisBody {
    pub levenshtein_accuracy: f64,
    pub response_time: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Wire response of `POST /analyze-sound`.
#[derive(Debug, Deserialize)]
pub(crate) struct AudioResponse {
    pub transcript: String,
    pub analysis: AnalysisBody,
    #[serde(default)]
    pub audio_analysis: Option<serde_json::Value>,
    #[serde(default)]
    pub session_summary: Option<serde_json::Value>,
}

impl AudioResponse {
    pub fn into_analysis(self) -> AudioAnalysis {
        AudioAnalysis {
            transcript: self.transcript,
            levenshtein_accuracy: self.analysis.levenshtein_accuracy,
            response_time: self.analysis.response_time,
            audio_metrics: self.audio_analysis,
            session_summary: self.session_summary,
            extra: self.analysis.extra,
        }
    }
}
