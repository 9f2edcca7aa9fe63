use serde::{Deserialize, Deserializer, Serialize};

/// Number of items in the screening questionnaire. Fixed by the instrument.
pub const QUESTION_COUNT: usize = 10;

/// Input-shape violations. Always client-caused; the message names the
/// specific violated constraint.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("questionnaire must contain exactly 10 items, got {0}")]
    WrongItemCount(usize),

    #[error("questionnaire item {index} has score {score}; each score must be 0 or 1")]
    ScoreOutOfRange { index: usize, score: u8 },

    #[error("handwriting score must be 1, 2, or 3, got {0}")]
    HandwritingOutOfRange(u8),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("{kind} payload of {actual} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge {
        kind: &'static str,
        actual: usize,
        limit: usize,
    },
}

/// An ordered, validated set of exactly [`QUESTION_COUNT`] binary answers.
/// Construction goes through [`Questionnaire::from_scores`]; deserialization
/// re-validates, so a stored questionnaire can never be malformed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Questionnaire {
    items: Vec<u8>,
}

impl Questionnaire {
    pub fn from_scores(scores: &[u8]) -> Result<Self, ValidationError> {
        if scores.len() != QUESTION_COUNT {
            return Err(ValidationError::WrongItemCount(scores.len()));
        }
        for (index, &score) in scores.iter().enumerate() {
            if score > 1 {
                return Err(ValidationError::ScoreOutOfRange { index, score });
            }
        }
        Ok(Self {
            items: scores.to_vec(),
        })
    }

    /// The ten answers, in submission order.
    pub fn items(&self) -> &[u8] {
        &self.items
    }
}

impl<'de> Deserialize<'de> for Questionnaire {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let items = Vec::<u8>::deserialize(deserializer)?;
        Questionnaire::from_scores(&items).map_err(serde::de::Error::custom)
    }
}
