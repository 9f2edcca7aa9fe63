use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use lexiscreen_core::record::{AudioAnalysis, HandwritingScore};

use crate::error::InferenceError;
use crate::types::{AudioContext, AudioResponse, HandwritingResponse, ImagePayload};

const HANDWRITING_PATH: &str = "/handwriting";
const AUDIO_PATH: &str = "/analyze-sound";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Configuration for the inference-service HTTP client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// The two modality-specific scoring operations the pipeline delegates.
///
/// The client reports failures; it never substitutes results. Fallback
/// policy, where one exists, belongs to the coordinator.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn score_handwriting(
        &self,
        image: &ImagePayload,
    ) -> Result<HandwritingScore, InferenceError>;

    async fn score_audio(
        &self,
        wav: Bytes,
        context: &AudioContext,
    ) -> Result<AudioAnalysis, InferenceError>;
}

/// Multipart HTTP client for the external scoring service.
pub struct HttpInferenceClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpInferenceClient {
    pub fn new(config: &InferenceConfig) -> Self {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
                .timeout(request_timeout)
                .build()
                .expect("failed to build HTTP client"),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    async fn post_multipart(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<serde_json::Value, InferenceError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| InferenceError::from_reqwest(e, self.request_timeout))?;

        let status = response.status();
        if !status.is_success() {
            // Keep the structured error body so callers can tell "service
            // said no" apart from transport failures.
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::ServiceError {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl InferenceService for HttpInferenceClient {
    #[instrument(skip(self, image), fields(filename = %image.filename, len = image.bytes.len()))]
    async fn score_handwriting(
        &self,
        image: &ImagePayload,
    ) -> Result<HandwritingScore, InferenceError> {
        let part = reqwest::multipart::Part::bytes(image.bytes.to_vec())
            .file_name(image.filename.clone())
            .mime_str(&image.content_type)
            .map_err(|e| InferenceError::InvalidPayload(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("image", part);

        let body = self.post_multipart(HANDWRITING_PATH, form).await?;
        let parsed: HandwritingResponse = serde_json::from_value(body)
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

        u8::try_from(parsed.score)
            .ok()
            .and_then(|score| HandwritingScore::try_from(score).ok())
            .ok_or_else(|| {
                InferenceError::MalformedResponse(format!(
                    "handwriting score {} outside 1..=3",
                    parsed.score
                ))
            })
    }

    #[instrument(skip(self, wav, context), fields(test_type = %context.test_type, len = wav.len()))]
    async fn score_audio(
        &self,
        wav: Bytes,
        context: &AudioContext,
    ) -> Result<AudioAnalysis, InferenceError> {
        let data = serde_json::to_string(context)
            .map_err(|e| InferenceError::InvalidPayload(e.to_string()))?;
        let part = reqwest::multipart::Part::bytes(wav.to_vec())
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| InferenceError::InvalidPayload(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("data", data);

        let body = self.post_multipart(AUDIO_PATH, form).await?;
        let parsed: AudioResponse = serde_json::from_value(body)
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

        Ok(parsed.into_analysis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpInferenceClient {
        HttpInferenceClient::new(&InferenceConfig {
            base_url: server.uri(),
            connect_timeout_secs: 5,
            request_timeout_secs: 5,
        })
    }

    fn sample_image() -> ImagePayload {
        ImagePayload::new(Bytes::from_static(b"fake-jpeg-bytes"), "sample.jpg", "image/jpeg")
    }

    #[tokio::test]
    async fn handwriting_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/handwriting"))
            .and(body_string_contains("name=\"image\""))
            .and(body_string_contains("filename=\"sample.jpg\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"score": 2})))
            .mount(&server)
            .await;

        let score = client_for(&server)
            .score_handwriting(&sample_image())
            .await
            .unwrap();
        assert_eq!(score, HandwritingScore::Medium);
    }

    #[tokio::test]
    async fn handwriting_service_error_propagates_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/handwriting"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(json!({"message": "unsupported image format"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .score_handwriting(&sample_image())
            .await
            .unwrap_err();
        match err {
            InferenceError::ServiceError { status, body } => {
                assert_eq!(status, 422);
                assert!(body.contains("unsupported image format"));
            }
            other => panic!("expected ServiceError, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn handwriting_out_of_range_score_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/handwriting"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"score": 9})))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .score_handwriting(&sample_image())
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn handwriting_non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/handwriting"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .score_handwriting(&sample_image())
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn audio_success_carries_diagnostics() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze-sound"))
            .and(body_string_contains("name=\"file\""))
            .and(body_string_contains("recording.wav"))
            .and(body_string_contains("expected_text"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transcript": "the quick fox",
                "analysis": {
                    "levenshtein_accuracy": 0.91,
                    "response_time": 1.7,
                    "word_error_rate": 0.09
                },
                "audio_analysis": {"pitch_variance": 0.25},
                "session_summary": {"attempts": 1}
            })))
            .mount(&server)
            .await;

        let context = AudioContext::new("sentence", "the quick fox", crate::Difficulty::Easy);
        let analysis = client_for(&server)
            .score_audio(Bytes::from_static(b"RIFF....WAVE"), &context)
            .await
            .unwrap();

        assert_eq!(analysis.transcript, "the quick fox");
        assert_eq!(analysis.levenshtein_accuracy, 0.91);
        assert_eq!(analysis.response_time, 1.7);
        assert_eq!(analysis.extra["word_error_rate"], 0.09);
        assert!(analysis.audio_metrics.is_some());
    }

    #[tokio::test]
    async fn audio_missing_required_metrics_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze-sound"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transcript": "x",
                "analysis": {"response_time": 1.7}
            })))
            .mount(&server)
            .await;

        let context = AudioContext::new("word", "x", crate::Difficulty::Medium);
        let err = client_for(&server)
            .score_audio(Bytes::from_static(b"RIFF....WAVE"), &context)
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn audio_service_error_is_fatal_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze-sound"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"message": "model not loaded"})),
            )
            .mount(&server)
            .await;

        let context = AudioContext::new("word", "cat", crate::Difficulty::Medium);
        let err = client_for(&server)
            .score_audio(Bytes::from_static(b"RIFF....WAVE"), &context)
            .await
            .unwrap_err();
        match err {
            InferenceError::ServiceError { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("model not loaded"));
            }
            other => panic!("expected ServiceError, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        // Nothing listens here.
        let client = HttpInferenceClient::new(&InferenceConfig {
            base_url: "http://127.0.0.1:9".into(),
            connect_timeout_secs: 1,
            request_timeout_secs: 1,
        });
        let err = client.score_handwriting(&sample_image()).await.unwrap_err();
        assert!(
            matches!(err, InferenceError::Unreachable(_) | InferenceError::Timeout(_)),
            "got: {err:?}"
        );
    }

    #[test]
    fn config_defaults() {
        let config = InferenceConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn trailing_slash_in_base_url_is_tolerated() {
        let client = HttpInferenceClient::new(&InferenceConfig {
            base_url: "http://localhost:5000/".into(),
            ..Default::default()
        });
        assert_eq!(client.base_url, "http://localhost:5000");
    }
}
