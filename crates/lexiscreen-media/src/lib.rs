use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

/// A complete RIFF/WAVE header is at least 44 bytes.
pub const MIN_WAV_HEADER_LEN: usize = 44;

const DEFAULT_TRANSCODE_TIMEOUT_SECS: u64 = 30;

/// Check for a canonical audio container: "RIFF" at offset 0, "WAVE" at
/// offset 8, and at least a full header.
pub fn is_canonical_wav(bytes: &[u8]) -> bool {
    bytes.len() >= MIN_WAV_HEADER_LEN && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("audio payload is empty")]
    Empty,

    #[error("audio payload of {0} bytes is shorter than the 44-byte minimum header")]
    Truncated(usize),

    #[error("audio conversion failed: {diagnostic}")]
    ConversionFailed { diagnostic: String },

    #[error("failed to run transcoder {tool}: {detail}")]
    TranscoderUnavailable { tool: String, detail: String },

    #[error("audio conversion timed out after {0:?}")]
    Timeout(Duration),

    #[error("transcoder I/O error: {0}")]
    Io(String),
}

/// Configuration for the external codec process.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Path to the ffmpeg binary.
    pub ffmpeg_path: PathBuf,
    /// Wall-clock limit for one transcode.
    pub timeout_secs: u64,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            timeout_secs: DEFAULT_TRANSCODE_TIMEOUT_SECS,
        }
    }
}

/// Normalizes uploaded audio into canonical RIFF/WAVE (PCM 16-bit LE).
///
/// Already-canonical input passes through untouched; anything else is piped
/// through ffmpeg. Empty and sub-header-length buffers fail deterministically
/// without spawning the codec.
pub struct Transcoder {
    ffmpeg_path: PathBuf,
    timeout: Duration,
}

impl Transcoder {
    pub fn new(config: &TranscoderConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    #[instrument(skip(self, input), fields(len = input.len()))]
    pub async fn normalize(&self, input: Bytes) -> Result<Bytes, MediaError> {
        if input.is_empty() {
            return Err(MediaError::Empty);
        }
        if input.len() < MIN_WAV_HEADER_LEN {
            return Err(MediaError::Truncated(input.len()));
        }
        if is_canonical_wav(&input) {
            return Ok(input);
        }
        debug!("input is not canonical WAV; transcoding");
        self.transcode(input).await
    }

    async fn transcode(&self, input: Bytes) -> Result<Bytes, MediaError> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                "pipe:0",
                "-acodec",
                "pcm_s16le",
                "-f",
                "wav",
                "pipe:1",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::TranscoderUnavailable {
                tool: self.ffmpeg_path.display().to_string(),
                detail: e.to_string(),
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::Io("transcoder stdin unavailable".into()))?;

        // Feed stdin while draining stdout/stderr. A transcoder that rejects
        // its input may close stdin early; the exit status and stderr carry
        // the diagnostic, so write errors are not reported on their own.
        let feed = async move {
            let _ = stdin.write_all(&input).await;
            let _ = stdin.shutdown().await;
        };

        let run = async {
            let (_, output) = tokio::join!(feed, child.wait_with_output());
            output.map_err(|e| MediaError::Io(e.to_string()))
        };

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| MediaError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let diagnostic = match stderr.trim() {
                "" => format!("transcoder exited with {}", output.status),
                detail => detail.to_string(),
            };
            return Err(MediaError::ConversionFailed { diagnostic });
        }

        if output.stdout.is_empty() {
            return Err(MediaError::ConversionFailed {
                diagnostic: "transcoder produced no output".into(),
            });
        }

        Ok(Bytes::from(output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// 44-byte canonical header followed by a little payload.
    fn canonical_wav() -> Bytes {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&36u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        Bytes::from(bytes)
    }

    fn fake_transcoder(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn transcoder_at(path: PathBuf, timeout_secs: u64) -> Transcoder {
        Transcoder::new(&TranscoderConfig {
            ffmpeg_path: path,
            timeout_secs,
        })
    }

    #[test]
    fn canonical_check_accepts_well_formed_header() {
        assert!(is_canonical_wav(&canonical_wav()));
    }

    #[test]
    fn canonical_check_rejects_short_buffers() {
        assert!(!is_canonical_wav(b""));
        assert!(!is_canonical_wav(b"RIFF1234WAVE"));
        assert!(!is_canonical_wav(&[0u8; 43]));
    }

    #[test]
    fn canonical_check_rejects_wrong_markers() {
        let mut bytes = canonical_wav().to_vec();
        bytes[0] = b'X';
        assert!(!is_canonical_wav(&bytes));

        let mut bytes = canonical_wav().to_vec();
        bytes[8..12].copy_from_slice(b"AIFF");
        assert!(!is_canonical_wav(&bytes));
    }

    #[tokio::test]
    async fn empty_input_fails_without_spawning() {
        // A nonexistent tool proves the codec is never consulted.
        let t = transcoder_at(PathBuf::from("/nonexistent/ffmpeg"), 5);
        let err = t.normalize(Bytes::new()).await.unwrap_err();
        assert!(matches!(err, MediaError::Empty));
    }

    #[tokio::test]
    async fn truncated_input_fails_without_spawning() {
        let t = transcoder_at(PathBuf::from("/nonexistent/ffmpeg"), 5);
        let err = t.normalize(Bytes::from_static(&[1u8; 20])).await.unwrap_err();
        assert!(matches!(err, MediaError::Truncated(20)));
    }

    #[tokio::test]
    async fn canonical_input_passes_through_unchanged() {
        let t = transcoder_at(PathBuf::from("/nonexistent/ffmpeg"), 5);
        let input = canonical_wav();
        let output = t.normalize(input.clone()).await.unwrap();
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn non_canonical_input_is_piped_through_the_codec() {
        let dir = tempfile::tempdir().unwrap();
        let t = transcoder_at(fake_transcoder(dir.path(), "cat"), 5);
        let input = Bytes::from(vec![7u8; 64]);
        let output = t.normalize(input.clone()).await.unwrap();
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn codec_failure_carries_the_tool_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let t = transcoder_at(
            fake_transcoder(
                dir.path(),
                "echo 'pipe:0: Invalid data found when processing input' >&2; exit 1",
            ),
            5,
        );
        let err = t.normalize(Bytes::from(vec![7u8; 64])).await.unwrap_err();
        match err {
            MediaError::ConversionFailed { diagnostic } => {
                assert!(diagnostic.contains("Invalid data"), "got: {diagnostic}")
            }
            other => panic!("expected ConversionFailed, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn codec_failure_without_stderr_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let t = transcoder_at(fake_transcoder(dir.path(), "exit 1"), 5);
        let err = t.normalize(Bytes::from(vec![7u8; 64])).await.unwrap_err();
        match err {
            MediaError::ConversionFailed { diagnostic } => {
                assert!(diagnostic.contains("exited"), "got: {diagnostic}")
            }
            other => panic!("expected ConversionFailed, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_codec_output_is_a_conversion_failure() {
        let dir = tempfile::tempdir().unwrap();
        let t = transcoder_at(fake_transcoder(dir.path(), "exit 0"), 5);
        let err = t.normalize(Bytes::from(vec![7u8; 64])).await.unwrap_err();
        assert!(matches!(err, MediaError::ConversionFailed { .. }));
    }

    #[tokio::test]
    async fn missing_codec_binary_is_reported_as_unavailable() {
        let t = transcoder_at(PathBuf::from("/nonexistent/ffmpeg"), 5);
        let err = t.normalize(Bytes::from(vec![7u8; 64])).await.unwrap_err();
        match err {
            MediaError::TranscoderUnavailable { tool, .. } => {
                assert_eq!(tool, "/nonexistent/ffmpeg")
            }
            other => panic!("expected TranscoderUnavailable, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_codec_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_transcoder(dir.path(), "sleep 30");
        let t = Transcoder {
            ffmpeg_path: path,
            timeout: Duration::from_millis(200),
        };
        let err = t.normalize(Bytes::from(vec![7u8; 64])).await.unwrap_err();
        assert!(matches!(err, MediaError::Timeout(_)));
    }

    #[test]
    fn default_config() {
        let config = TranscoderConfig::default();
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.timeout_secs, DEFAULT_TRANSCODE_TIMEOUT_SECS);
    }
}
