use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{LektorError, Result};

/// Converts a video container into the audio form the transcriber expects.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn convert(&self, video: &Path, audio: &Path) -> Result<()>;
}

/// Shells out to ffmpeg for mono 16kHz PCM extraction.
pub struct FfmpegExtractor;

#[async_trait]
impl AudioExtractor for FfmpegExtractor {
    async fn convert(&self, video: &Path, audio: &Path) -> Result<()> {
        if !video.exists() {
            return Err(LektorError::AudioExtractionFailed {
                video_path: video.to_path_buf(),
                reason: "video file does not exist".to_string(),
            });
        }

        debug!(video = %video.display(), audio = %audio.display(), "running ffmpeg");
        let output = Command::new("ffmpeg")
            .arg("-y")
            .arg("-i")
            .arg(video)
            .arg("-vn")
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg("-ar")
            .arg("16000")
            .arg("-ac")
            .arg("1")
            .arg(audio)
            .output()
            .await?;

        if !output.status.success() {
            return Err(LektorError::AudioExtractionFailed {
                video_path: video.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(())
    }
}
