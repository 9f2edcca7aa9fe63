use serde::{Deserialize, Serialize};

use lexiscreen_inference::InferenceConfig;
use lexiscreen_media::TranscoderConfig;

const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_MAX_AUDIO_BYTES: usize = 5 * 1024 * 1024;

/// Payload caps enforced before any media reaches the normalizer or the
/// gateway client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaLimits {
    pub max_image_bytes: usize,
    pub max_audio_bytes: usize,
}

impl Default for MediaLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            max_audio_bytes: DEFAULT_MAX_AUDIO_BYTES,
        }
    }
}

/// Top-level configuration for the evaluation pipeline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub inference: InferenceConfig,
    pub transcoder: TranscoderConfig,
    pub limits: MediaLimits,
}
