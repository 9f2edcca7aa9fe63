use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;
use tracing::{info, instrument, warn};

use lexiscreen_core::ids::UserId;
use lexiscreen_core::questionnaire::{Questionnaire, ValidationError};
use lexiscreen_core::record::{AssessmentRecord, AudioAnalysis, HandwritingScore, Role};
use lexiscreen_core::risk::{self, RiskBreakdown};
use lexiscreen_inference::{
    AudioContext, HttpInferenceClient, ImagePayload, InferenceError, InferenceService,
};
use lexiscreen_media::Transcoder;
use lexiscreen_store::{AssessmentRepo, Database, StoreError, UserRepo};
use lexiscreen_telemetry::MetricsRecorder;

use crate::config::{MediaLimits, PipelineConfig};
use crate::error::PipelineError;

/// Counter bumped whenever the handwriting fallback substitutes a score.
pub const FALLBACK_COUNTER: &str = "handwriting.fallback";
/// Counter for external inference failures, labelled by modality and kind.
pub const INFERENCE_FAILURE_COUNTER: &str = "inference.failures";

/// Result of scoring a handwriting image. `fallback` is true when the score
/// was locally generated because the inference service failed.
#[derive(Clone, Debug)]
pub struct HandwritingOutcome {
    pub score: HandwritingScore,
    pub fallback: bool,
    pub record: AssessmentRecord,
}

#[derive(Clone, Debug)]
pub struct AudioOutcome {
    pub analysis: AudioAnalysis,
    pub record: AssessmentRecord,
}

#[derive(Clone, Debug)]
pub struct RiskOutcome {
    pub breakdown: RiskBreakdown,
    pub record: AssessmentRecord,
}

/// Orchestrates the evaluation pipeline against the per-user assessment
/// record: validate shape, invoke the right sub-pipeline, merge the partial
/// result, return the updated projection.
///
/// Purely request-scoped; no cross-request state lives here. Each operation
/// is an independent future; dropping it cancels in-flight external calls
/// best-effort, and since persistence is the terminal step, a cancelled
/// request merges nothing.
pub struct AssessmentCoordinator {
    inference: Arc<dyn InferenceService>,
    transcoder: Transcoder,
    users: UserRepo,
    assessments: AssessmentRepo,
    limits: MediaLimits,
    metrics: Arc<MetricsRecorder>,
}

impl AssessmentCoordinator {
    pub fn new(
        db: Database,
        inference: Arc<dyn InferenceService>,
        transcoder: Transcoder,
        limits: MediaLimits,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            inference,
            transcoder,
            users: UserRepo::new(db.clone()),
            assessments: AssessmentRepo::new(db),
            limits,
            metrics,
        }
    }

    /// Build a coordinator with the real HTTP inference client.
    pub fn from_config(config: &PipelineConfig, db: Database, metrics: Arc<MetricsRecorder>) -> Self {
        Self::new(
            db,
            Arc::new(HttpInferenceClient::new(&config.inference)),
            Transcoder::new(&config.transcoder),
            config.limits.clone(),
            metrics,
        )
    }

    /// Persist a questionnaire verbatim. Does not compute the risk score;
    /// that is a separate explicit operation.
    #[instrument(skip(self, scores), fields(user_id = %user_id, operation = "submit_questionnaire"))]
    pub async fn submit_questionnaire(
        &self,
        user_id: &UserId,
        scores: &[u8],
    ) -> Result<AssessmentRecord, PipelineError> {
        let questionnaire = Questionnaire::from_scores(scores)?;
        self.require_student(user_id)?;
        self.assessments.load_or_create(user_id)?;
        let record = self.assessments.set_questionnaire(user_id, &questionnaire)?;
        info!(user_id = %user_id, "questionnaire stored");
        Ok(record)
    }

    /// Persist a manually-entered handwriting tier.
    #[instrument(skip(self), fields(user_id = %user_id, operation = "submit_handwriting"))]
    pub async fn submit_handwriting(
        &self,
        user_id: &UserId,
        score: u8,
    ) -> Result<AssessmentRecord, PipelineError> {
        let score = HandwritingScore::try_from(score)?;
        self.require_student(user_id)?;
        self.assessments.load_or_create(user_id)?;
        Ok(self.assessments.set_handwriting(user_id, score, false)?)
    }

    /// Score a handwriting image via the inference service and persist the
    /// tier. Inference failure does not fail the request: a locally-generated
    /// tier is stored instead, flagged as a fallback and counted for quality
    /// monitoring.
    #[instrument(skip(self, image), fields(user_id = %user_id, operation = "submit_handwriting_image"))]
    pub async fn submit_handwriting_image(
        &self,
        user_id: &UserId,
        image: ImagePayload,
    ) -> Result<HandwritingOutcome, PipelineError> {
        if image.bytes.is_empty() {
            return Err(ValidationError::MissingField("image").into());
        }
        if image.bytes.len() > self.limits.max_image_bytes {
            return Err(ValidationError::PayloadTooLarge {
                kind: "image",
                actual: image.bytes.len(),
                limit: self.limits.max_image_bytes,
            }
            .into());
        }
        self.require_student(user_id)?;

        let (score, fallback) = match self.inference.score_handwriting(&image).await {
            Ok(score) => (score, false),
            Err(err) => {
                self.metrics.counter_inc(
                    INFERENCE_FAILURE_COUNTER,
                    &[("modality", "handwriting"), ("kind", err.error_kind())],
                    1,
                );
                self.metrics
                    .counter_inc(FALLBACK_COUNTER, &[("reason", err.error_kind())], 1);
                let score = random_fallback_score();
                warn!(
                    user_id = %user_id,
                    error = %err,
                    fallback_score = score.as_u8(),
                    "handwriting inference failed; storing fallback score"
                );
                (score, true)
            }
        };

        self.assessments.load_or_create(user_id)?;
        let record = self.assessments.set_handwriting(user_id, score, fallback)?;
        Ok(HandwritingOutcome {
            score,
            fallback,
            record,
        })
    }

    /// Normalize a recording, score it via the inference service, and merge
    /// the analysis into the record. No fallback exists for audio: any
    /// normalizer or service failure aborts before the record is touched.
    #[instrument(skip(self, audio, context), fields(user_id = %user_id, operation = "submit_audio", test_type = %context.test_type))]
    pub async fn submit_audio(
        &self,
        user_id: &UserId,
        audio: Bytes,
        context: &AudioContext,
    ) -> Result<AudioOutcome, PipelineError> {
        if context.test_type.trim().is_empty() {
            return Err(ValidationError::MissingField("test_type").into());
        }
        if context.expected_text.trim().is_empty() {
            return Err(ValidationError::MissingField("expected_text").into());
        }
        if audio.len() > self.limits.max_audio_bytes {
            return Err(ValidationError::PayloadTooLarge {
                kind: "audio",
                actual: audio.len(),
                limit: self.limits.max_audio_bytes,
            }
            .into());
        }
        self.require_student(user_id)?;

        let canonical = self.transcoder.normalize(audio).await?;
        let analysis = self.inference.score_audio(canonical, context).await?;
        ensure_analysis_contract(&analysis)?;

        self.assessments.load_or_create(user_id)?;
        let record = self.assessments.set_audio_analysis(user_id, &analysis)?;
        info!(user_id = %user_id, accuracy = analysis.levenshtein_accuracy, "audio analysis stored");
        Ok(AudioOutcome { analysis, record })
    }

    /// Score the stored questionnaire and persist the normalized risk.
    #[instrument(skip(self), fields(user_id = %user_id, operation = "compute_risk"))]
    pub async fn compute_risk(&self, user_id: &UserId) -> Result<RiskOutcome, PipelineError> {
        self.require_student(user_id)?;

        let record = match self.assessments.get(user_id) {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                return Err(PipelineError::InvalidState(format!(
                    "no assessment on file for user {user_id}"
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let questionnaire = record.questionnaire.ok_or_else(|| {
            PipelineError::InvalidState(format!(
                "user {user_id} has not submitted a questionnaire"
            ))
        })?;

        let breakdown = risk::assess(&questionnaire);
        let record = self.assessments.set_risk_score(user_id, breakdown.score)?;
        info!(user_id = %user_id, risk_score = breakdown.score, "risk score stored");
        Ok(RiskOutcome { breakdown, record })
    }

    fn require_student(&self, user_id: &UserId) -> Result<(), PipelineError> {
        let user = match self.users.get(user_id) {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                return Err(PipelineError::UserNotFound(user_id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        if user.role != Role::Student {
            return Err(PipelineError::NotAStudent {
                user_id: user_id.clone(),
                role: user.role,
            });
        }
        Ok(())
    }
}

/// Uniform over the three tiers, matching the historical fallback behavior.
fn random_fallback_score() -> HandwritingScore {
    match rand::thread_rng().gen_range(1u8..=3) {
        1 => HandwritingScore::Low,
        2 => HandwritingScore::Medium,
        _ => HandwritingScore::High,
    }
}

/// Required-fields contract for the schema-less analysis payload.
fn ensure_analysis_contract(analysis: &AudioAnalysis) -> Result<(), PipelineError> {
    if !analysis.levenshtein_accuracy.is_finite() || !analysis.response_time.is_finite() {
        return Err(InferenceError::MalformedResponse(
            "analysis metrics are not finite numbers".into(),
        )
        .into());
    }
    Ok(())
}
