pub mod config;
pub mod error;
pub mod materials;
pub mod orchestrate;
pub mod progress;
pub mod reconcile;
pub mod sentence;
pub mod stages;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{PipelineConfig, RemoteFolders, ScratchDirs};
pub use error::{LektorError, Result};
pub use materials::MaterialKind;
pub use orchestrate::{Orchestrator, RunSummary};
pub use progress::{Progress, ProgressEvent};
pub use reconcile::{AssetStage, Reconciler, StageKind, StemOutcome};
pub use sentence::{Sentence, Word, assemble_sentences, format_transcript_tsv};
pub use stages::{
    AudioExtractor, ChatGrader, FfmpegExtractor, Grader, Provider, Transcriber,
    WhisperTranscriber,
};
pub use store::{DriveStore, RemoteFile, RemoteStore, folder_id_from_url};
