use serde::{Deserialize, Serialize};

use crate::questionnaire::{Questionnaire, QUESTION_COUNT};

/// Relevance weight per questionnaire item, in item order. Domain-calibrated;
/// the items cover letter/number recognition, sound association, letter
/// mixing, multi-step instructions, vocabulary retention, letter order,
/// reading/writing frustration, sequence memory, rhyming, and hand-eye
/// coordination.
pub const QUESTION_WEIGHTS: [f64; QUESTION_COUNT] =
    [0.9, 0.8, 0.9, 0.6, 0.8, 0.7, 0.9, 0.7, 0.8, 0.6];

/// Weight a negative answer still contributes to the answered-weight
/// accumulator.
const NEGATIVE_ANSWER_FACTOR: f64 = 0.2;

/// Composite risk derived from a questionnaire.
///
/// `answered_weight` mirrors the historical accumulator (positive hits at
/// full weight, negative answers at [`NEGATIVE_ANSWER_FACTOR`]); the
/// normalized `score` divides by the full weight sum, not by
/// `answered_weight`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskBreakdown {
    /// Sum of weights for positively-answered items.
    pub weighted: f64,
    /// Accumulated denominator weight; reported for diagnostics only.
    pub answered_weight: f64,
    /// Normalized risk in [0, 10], one decimal place.
    pub score: f64,
}

/// Score a questionnaire. Pure and deterministic: same input, same output.
pub fn assess(questionnaire: &Questionnaire) -> RiskBreakdown {
    let mut weighted = 0.0;
    let mut answered_weight = 0.0;

    for (item, &weight) in questionnaire.items().iter().zip(QUESTION_WEIGHTS.iter()) {
        if *item == 1 {
            weighted += weight;
            answered_weight += weight;
        } else {
            answered_weight += weight * NEGATIVE_ANSWER_FACTOR;
        }
    }

    let max_possible: f64 = QUESTION_WEIGHTS.iter().sum();
    let score = round_one_decimal(weighted / max_possible * 10.0);

    RiskBreakdown {
        weighted,
        answered_weight,
        score,
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
