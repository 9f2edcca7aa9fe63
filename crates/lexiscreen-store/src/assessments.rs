use chrono::Utc;
use rusqlite::Connection;
use tracing::instrument;

use lexiscreen_core::ids::UserId;
use lexiscreen_core::questionnaire::Questionnaire;
use lexiscreen_core::record::{AdaptiveLearning, AssessmentRecord, AudioAnalysis, HandwritingScore};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const SELECT_RECORD: &str = "SELECT user_id, questionnaire, handwriting_score, handwriting_fallback,
        audio_analysis, risk_score, adaptive_learning, created_at, updated_at
 FROM assessments WHERE user_id = ?1";

/// Repository for the per-student assessment record.
///
/// Every mutation is a targeted single-field UPDATE followed by a re-read,
/// both under one connection-lock acquisition. Writers touching different
/// fields of the same record therefore never clobber each other; two writers
/// racing on the same field are last-writer-wins.
pub struct AssessmentRepo {
    db: Database,
}

impl AssessmentRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get the assessment record for a user.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn get(&self, user_id: &UserId) -> Result<AssessmentRecord, StoreError> {
        self.db.with_conn(|conn| select_record(conn, user_id))
    }

    /// Load the record, creating it with default adaptive-learning priors if
    /// this is the first time any modality is scored for the user. Exactly
    /// one record per user: the primary key makes creation idempotent.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn load_or_create(&self, user_id: &UserId) -> Result<AssessmentRecord, StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            let priors = serde_json::to_string(&AdaptiveLearning::default())?;
            conn.execute(
                "INSERT OR IGNORE INTO assessments (user_id, adaptive_learning, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![user_id.as_str(), priors, now, now],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::NotFound(format!("user {user_id}"))
                }
                other => StoreError::from(other),
            })?;
            select_record(conn, user_id)
        })
    }

    /// Persist the questionnaire verbatim.
    #[instrument(skip(self, questionnaire), fields(user_id = %user_id))]
    pub fn set_questionnaire(
        &self,
        user_id: &UserId,
        questionnaire: &Questionnaire,
    ) -> Result<AssessmentRecord, StoreError> {
        let json = serde_json::to_string(questionnaire)?;
        self.update_field(
            user_id,
            "UPDATE assessments SET questionnaire = ?1, updated_at = ?2 WHERE user_id = ?3",
            &json,
        )
    }

    /// Persist the handwriting tier together with its provenance flag.
    #[instrument(skip(self), fields(user_id = %user_id, score = score.as_u8(), fallback))]
    pub fn set_handwriting(
        &self,
        user_id: &UserId,
        score: HandwritingScore,
        fallback: bool,
    ) -> Result<AssessmentRecord, StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            let changed = conn.execute(
                "UPDATE assessments SET handwriting_score = ?1, handwriting_fallback = ?2,
                        updated_at = ?3 WHERE user_id = ?4",
                rusqlite::params![score.as_u8() as i64, fallback as i64, now, user_id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("assessment for user {user_id}")));
            }
            select_record(conn, user_id)
        })
    }

    /// Persist the audio analysis verbatim.
    #[instrument(skip(self, analysis), fields(user_id = %user_id))]
    pub fn set_audio_analysis(
        &self,
        user_id: &UserId,
        analysis: &AudioAnalysis,
    ) -> Result<AssessmentRecord, StoreError> {
        let json = serde_json::to_string(analysis)?;
        self.update_field(
            user_id,
            "UPDATE assessments SET audio_analysis = ?1, updated_at = ?2 WHERE user_id = ?3",
            &json,
        )
    }

    #[instrument(skip(self), fields(user_id = %user_id, score))]
    pub fn set_risk_score(
        &self,
        user_id: &UserId,
        score: f64,
    ) -> Result<AssessmentRecord, StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            let changed = conn.execute(
                "UPDATE assessments SET risk_score = ?1, updated_at = ?2 WHERE user_id = ?3",
                rusqlite::params![score, now, user_id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("assessment for user {user_id}")));
            }
            select_record(conn, user_id)
        })
    }

    #[instrument(skip(self, parameters), fields(user_id = %user_id))]
    pub fn set_adaptive_learning(
        &self,
        user_id: &UserId,
        parameters: &AdaptiveLearning,
    ) -> Result<AssessmentRecord, StoreError> {
        let json = serde_json::to_string(parameters)?;
        self.update_field(
            user_id,
            "UPDATE assessments SET adaptive_learning = ?1, updated_at = ?2 WHERE user_id = ?3",
            &json,
        )
    }

    fn update_field(
        &self,
        user_id: &UserId,
        sql: &str,
        value: &str,
    ) -> Result<AssessmentRecord, StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            let changed = conn.execute(sql, rusqlite::params![value, now, user_id.as_str()])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("assessment for user {user_id}")));
            }
            select_record(conn, user_id)
        })
    }
}

fn select_record(conn: &Connection, user_id: &UserId) -> Result<AssessmentRecord, StoreError> {
    let mut stmt = conn.prepare(SELECT_RECORD)?;
    let mut rows = stmt.query([user_id.as_str()])?;
    match rows.next()? {
        Some(row) => row_to_record(row),
        None => Err(StoreError::NotFound(format!("assessment for user {user_id}"))),
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<AssessmentRecord, StoreError> {
    let questionnaire = row_helpers::get_opt::<String>(row, 1, "assessments", "questionnaire")?
        .map(|raw| row_helpers::parse_json::<Questionnaire>(&raw, "assessments", "questionnaire"))
        .transpose()?;

    let handwriting = row_helpers::get_opt::<i64>(row, 2, "assessments", "handwriting_score")?
        .map(|raw| {
            u8::try_from(raw)
                .ok()
                .and_then(|v| HandwritingScore::try_from(v).ok())
                .ok_or(StoreError::CorruptRow {
                    table: "assessments",
                    column: "handwriting_score",
                    detail: format!("value {raw} outside 1..=3"),
                })
        })
        .transpose()?;

    let audio = row_helpers::get_opt::<String>(row, 4, "assessments", "audio_analysis")?
        .map(|raw| row_helpers::parse_json::<AudioAnalysis>(&raw, "assessments", "audio_analysis"))
        .transpose()?;

    let adaptive_raw: String = row_helpers::get(row, 6, "assessments", "adaptive_learning")?;

    Ok(AssessmentRecord {
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 0, "assessments", "user_id")?),
        questionnaire,
        handwriting,
        handwriting_fallback: row_helpers::get::<i64>(row, 3, "assessments", "handwriting_fallback")?
            != 0,
        audio,
        risk_score: row_helpers::get_opt(row, 5, "assessments", "risk_score")?,
        adaptive_learning: row_helpers::parse_json(&adaptive_raw, "assessments", "adaptive_learning")?,
        created_at: row_helpers::get(row, 7, "assessments", "created_at")?,
        updated_at: row_helpers::get(row, 8, "assessments", "updated_at")?,
    })
}
