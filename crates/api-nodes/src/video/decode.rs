//! Video decoding into image batches and audio waveforms

use crate::error::{ApiNodeError, Result};
use async_trait::async_trait;
use ck_nodes_core::{AudioWaveform, ImageBatch};
use std::path::{Path, PathBuf};

pub const FALLBACK_FPS: f64 = 24.0;
const PLACEHOLDER_SIZE: usize = 64;

/// Decoded frames and frame rate
#[derive(Debug, Clone)]
pub struct DecodedFrames {
    pub images: ImageBatch,
    pub fps: f64,
}

impl DecodedFrames {
    /// Stand-in for a video without decodable frames
    pub fn placeholder() -> Self {
        Self {
            images: placeholder_frames(),
            fps: FALLBACK_FPS,
        }
    }
}

/// Frames used when a video has none
pub fn placeholder_frames() -> ImageBatch {
    ImageBatch::zeros(1, PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, 3)
}

#[async_trait]
pub trait MediaDecoder: Send + Sync {
    /// RGB frames in [0, 1] and the frame rate
    async fn decode_frames(&self, path: &Path) -> Result<DecodedFrames>;

    /// Stereo audio track, `None` when the file has none or decoding fails
    async fn decode_audio(&self, path: &Path) -> Option<AudioWaveform>;
}

/// Frame rate from the first and last presentation times, in seconds
///
/// A single frame, missing timestamps or a non-positive span give the fallback.
pub fn estimate_fps(first_pts: Option<f64>, last_pts: Option<f64>, frames: usize) -> f64 {
    let fps = match (first_pts, last_pts) {
        (Some(first), Some(last)) if frames > 1 => (frames - 1) as f64 / (last - first),
        _ => 0.0,
    };
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        FALLBACK_FPS
    }
}

/// Little-endian f32 samples
pub fn f32le_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Read a WAV file into a waveform, integer formats normalised to [-1, 1]
pub fn read_wav(path: &Path) -> Result<AudioWaveform> {
    let mut reader =
        hound::WavReader::open(path).map_err(|e| ApiNodeError::decode(e.to_string()))?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| ApiNodeError::decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| ApiNodeError::decode(e.to_string()))?
        }
    };
    if samples.is_empty() {
        return Err(ApiNodeError::decode("no audio samples"));
    }
    Ok(AudioWaveform::from_interleaved(
        &samples,
        spec.channels.max(1) as usize,
        spec.sample_rate,
    ))
}

#[cfg(feature = "video")]
use super::ffmpeg::{decode_audio_track, decode_video_frames};

#[cfg(not(feature = "video"))]
fn decode_video_frames(_path: &Path) -> Result<DecodedFrames> {
    Err(ApiNodeError::decode("built without the `video` feature"))
}

#[cfg(not(feature = "video"))]
fn decode_audio_track(_path: &Path) -> Result<AudioWaveform> {
    Err(ApiNodeError::decode("built without the `video` feature"))
}

/// Audio from the container, then the file as plain WAV
fn decode_audio_blocking(path: &Path) -> Result<AudioWaveform> {
    let container = match decode_audio_track(path) {
        Ok(audio) => return Ok(audio),
        Err(e) => e,
    };
    tracing::debug!(error = %container, "Container audio decode failed, trying WAV");
    read_wav(path).map_err(|wav| ApiNodeError::decode(format!("{}; wav: {}", container, wav)))
}

async fn blocking<T, F>(path: &Path, decode: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Path) -> Result<T> + Send + 'static,
{
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || decode(&path))
        .await
        .map_err(|e| ApiNodeError::decode(e.to_string()))?
}

/// [`MediaDecoder`] on the FFmpeg libraries (`video` feature)
///
/// Decoding runs on the blocking pool. Without the feature frame decoding
/// fails and audio is only read from WAV files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegDecoder;

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaDecoder for FfmpegDecoder {
    async fn decode_frames(&self, path: &Path) -> Result<DecodedFrames> {
        let frames = blocking(path, decode_video_frames).await?;
        tracing::debug!(
            path = %path.display(),
            frames = frames.images.len(),
            fps = frames.fps,
            "Decoded video frames"
        );
        Ok(frames)
    }

    async fn decode_audio(&self, path: &Path) -> Option<AudioWaveform> {
        match blocking(path, decode_audio_blocking).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                tracing::warn!(error = %e, "Audio decode failed, continuing without audio");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_fps() {
        assert_eq!(estimate_fps(Some(0.0), Some(1.0), 25), 24.0);
        assert!((estimate_fps(Some(0.0), Some(2.0), 61) - 30.0).abs() < 1e-9);
        assert_eq!(estimate_fps(Some(0.0), Some(0.0), 5), FALLBACK_FPS);
        assert_eq!(estimate_fps(Some(1.0), Some(1.0), 1), FALLBACK_FPS);
        assert_eq!(estimate_fps(None, Some(3.0), 10), FALLBACK_FPS);
    }

    #[test]
    fn test_f32le_samples_ignores_partial_tail() {
        let mut bytes = 0.5f32.to_le_bytes().to_vec();
        bytes.extend((-1.0f32).to_le_bytes());
        bytes.push(7);
        assert_eq!(f32le_samples(&bytes), vec![0.5, -1.0]);
    }

    fn write_wav(path: &Path) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for sample in [16384i16, -16384, 0, 32767] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_read_wav_normalises_int_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path);

        let audio = read_wav(&path).unwrap();
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.samples(), 2);
        assert_eq!(audio.sample_rate, 8000);
        assert!((audio.waveform[[0, 0, 0]] - 0.5).abs() < 1e-6);
        assert!((audio.waveform[[0, 1, 0]] + 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.mp4");
        std::fs::write(&path, b"not a video").unwrap();

        let decoder = FfmpegDecoder::new();
        let err = decoder.decode_frames(&path).await.unwrap_err();
        assert!(matches!(err, ApiNodeError::Decode(_)));
        assert!(decoder.decode_audio(&path).await.is_none());
    }

    #[tokio::test]
    async fn test_wav_audio_decodes_through_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path);

        let audio = FfmpegDecoder::new().decode_audio(&path).await.unwrap();
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.sample_rate, 8000);
    }

    #[test]
    fn test_placeholder_uses_fallback_rate() {
        let frames = DecodedFrames::placeholder();
        assert_eq!(frames.images.data().dim(), (1, 64, 64, 3));
        assert_eq!(frames.fps, FALLBACK_FPS);
    }
}
