use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::questionnaire::{Questionnaire, ValidationError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Parent,
    Teacher,
    Student,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parent => write!(f, "parent"),
            Self::Teacher => write!(f, "teacher"),
            Self::Student => write!(f, "student"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parent" => Ok(Self::Parent),
            "teacher" => Ok(Self::Teacher),
            "student" => Ok(Self::Student),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Handwriting proficiency tier as reported by the inference service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandwritingScore {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl HandwritingScore {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for HandwritingScore {
    type Error = ValidationError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            other => Err(ValidationError::HandwritingOutOfRange(other)),
        }
    }
}

/// Structured result of scoring a spoken-word recording.
///
/// `transcript`, `levenshtein_accuracy` and `response_time` are the required
/// fields the coordinator asserts before persisting; everything else the
/// service reports is kept verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioAnalysis {
    pub transcript: String,
    pub levenshtein_accuracy: f64,
    pub response_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_metrics: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_summary: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Success probability per difficulty tier for one skill category.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierProbabilities {
    pub easy: f64,
    pub medium: f64,
    pub hard: f64,
}

/// Per-skill-category adaptive-difficulty parameters. Values are
/// probabilities in [0,1]; defaults are the screening priors a new student
/// starts from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveLearning {
    pub letter: TierProbabilities,
    pub words: TierProbabilities,
    pub complex_words: TierProbabilities,
    pub sentence: TierProbabilities,
    pub complex_sentence: TierProbabilities,
}

impl Default for AdaptiveLearning {
    fn default() -> Self {
        Self {
            letter: TierProbabilities { easy: 0.8, medium: 0.5, hard: 0.2 },
            words: TierProbabilities { easy: 0.7, medium: 0.4, hard: 0.1 },
            complex_words: TierProbabilities { easy: 0.6, medium: 0.3, hard: 0.1 },
            sentence: TierProbabilities { easy: 0.5, medium: 0.3, hard: 0.1 },
            complex_sentence: TierProbabilities { easy: 0.4, medium: 0.2, hard: 0.1 },
        }
    }
}

/// The single authoritative assessment record for one student.
///
/// Mutated exclusively through field-level partial updates; `handwriting_fallback`
/// is true when the stored tier came from the fallback policy rather than the
/// inference service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub user_id: UserId,
    pub questionnaire: Option<Questionnaire>,
    pub handwriting: Option<HandwritingScore>,
    pub handwriting_fallback: bool,
    pub audio: Option<AudioAnalysis>,
    pub risk_score: Option<f64>,
    pub adaptive_learning: AdaptiveLearning,
    pub created_at: String,
    pub updated_at: String,
}
