use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LektorError {
    #[error("Download failed for {name}: {reason}")]
    DownloadFailed { name: String, reason: String },

    #[error("Audio extraction failed for {video_path}: {reason}")]
    AudioExtractionFailed { video_path: PathBuf, reason: String },

    #[error("Transcription failed for {audio_path}: {reason}")]
    TranscriptionFailed { audio_path: PathBuf, reason: String },

    #[error("Transcript for {audio_path} contains no sentences")]
    EmptyTranscript { audio_path: PathBuf },

    #[error("Grading failed: {reason}")]
    GradeFailed { reason: String },

    #[error("Material ingestion failed for {path}: {reason}")]
    MaterialFailed { path: PathBuf, reason: String },

    #[error("Remote store error: {reason}")]
    StoreError { reason: String },

    #[error("Model download failed from {url}: {reason}")]
    ModelDownloadFailed { url: String, reason: String },

    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, LektorError>;
