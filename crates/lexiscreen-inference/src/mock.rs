use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use lexiscreen_core::record::{AudioAnalysis, HandwritingScore};

use crate::client::InferenceService;
use crate::error::InferenceError;
use crate::types::{AudioContext, ImagePayload};

/// Pre-programmed responses for deterministic coordinator tests without a
/// live service. Responses are consumed in FIFO order per operation; an
/// exhausted queue reports the service as unreachable.
#[derive(Default)]
pub struct MockInferenceService {
    handwriting: Mutex<VecDeque<Result<HandwritingScore, InferenceError>>>,
    audio: Mutex<VecDeque<Result<AudioAnalysis, InferenceError>>>,
    handwriting_calls: AtomicUsize,
    audio_calls: AtomicUsize,
}

impl MockInferenceService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_handwriting(&self, response: Result<HandwritingScore, InferenceError>) {
        self.handwriting.lock().push_back(response);
    }

    pub fn enqueue_audio(&self, response: Result<AudioAnalysis, InferenceError>) {
        self.audio.lock().push_back(response);
    }

    pub fn handwriting_calls(&self) -> usize {
        self.handwriting_calls.load(Ordering::Relaxed)
    }

    pub fn audio_calls(&self) -> usize {
        self.audio_calls.load(Ordering::Relaxed)
    }

    /// Convenience: a minimal well-formed analysis result.
    pub fn sample_analysis(transcript: &str) -> AudioAnalysis {
        AudioAnalysis {
            transcript: transcript.to_string(),
            levenshtein_accuracy: 0.9,
            response_time: 1.5,
            audio_metrics: None,
            session_summary: None,
            extra: serde_json::Map::new(),
        }
    }
}

#[async_trait]
impl InferenceService for MockInferenceService {
    async fn score_handwriting(
        &self,
        _image: &ImagePayload,
    ) -> Result<HandwritingScore, InferenceError> {
        let call = self.handwriting_calls.fetch_add(1, Ordering::Relaxed);
        self.handwriting.lock().pop_front().unwrap_or_else(|| {
            Err(InferenceError::Unreachable(format!(
                "mock: no handwriting response configured for call {call}"
            )))
        })
    }

    async fn score_audio(
        &self,
        _wav: Bytes,
        _context: &AudioContext,
    ) -> Result<AudioAnalysis, InferenceError> {
        let call = self.audio_calls.fetch_add(1, Ordering::Relaxed);
        self.audio.lock().pop_front().unwrap_or_else(|| {
            Err(InferenceError::Unreachable(format!(
                "mock: no audio response configured for call {call}"
            )))
        })
    }
}
