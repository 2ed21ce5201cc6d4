use std::collections::HashSet;
use std::fmt;

use tracing::{info, warn};

use crate::config::{RemoteFolders, ScratchDirs};
use crate::error::LektorError;
use crate::progress::{Progress, ProgressEvent};
use crate::stages::extract::AudioExtractor;
use crate::stages::transcribe::{TranscribeStage, Transcriber};
use crate::store::{
    ArtifactKind, RemoteFile, RemoteStore, best_effort_delete, best_effort_remove_file, stem_of,
};

/// The transformation a stem was in when something happened to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Download,
    ExtractAudio,
    Transcribe,
    Grade,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StageKind::Download => "download",
            StageKind::ExtractAudio => "extract audio",
            StageKind::Transcribe => "transcribe",
            StageKind::Grade => "grade",
        };
        write!(f, "{label}")
    }
}

/// Pipeline position of a stem, derived from which remote artifacts exist.
/// Recomputed from listings on every read; never stored, never the source of
/// truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStage {
    Pending,
    AudioExtracted,
    Transcribed,
    Reported,
}

/// Classify a stem from the remote catalogs.
pub fn stage_of(
    stem: &str,
    audio_stems: &HashSet<String>,
    transcript_stems: &HashSet<String>,
    report_stems: &HashSet<String>,
) -> AssetStage {
    if report_stems.contains(stem) {
        AssetStage::Reported
    } else if transcript_stems.contains(stem) {
        AssetStage::Transcribed
    } else if audio_stems.contains(stem) {
        AssetStage::AudioExtracted
    } else {
        AssetStage::Pending
    }
}

#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage: StageKind,
    pub reason: String,
}

impl StageFailure {
    fn new(stage: StageKind, err: LektorError) -> Self {
        Self {
            stage,
            reason: err.to_string(),
        }
    }
}

/// Outcome record for one stem of a reconciler sweep.
#[derive(Debug, Clone)]
pub struct StemOutcome {
    pub stem: String,
    pub reached: AssetStage,
    pub failure: Option<StageFailure>,
}

impl StemOutcome {
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Drives every known video stem forward through download → extract →
/// transcribe, deleting superseded intermediates as it advances. Owns all
/// stage-transition decisions; the executors only transform and report.
pub struct Reconciler<'a> {
    pub store: &'a dyn RemoteStore,
    pub extractor: &'a dyn AudioExtractor,
    pub transcriber: &'a dyn Transcriber,
    pub folders: &'a RemoteFolders,
    pub dirs: &'a ScratchDirs,
    pub progress: &'a Progress,
}

impl Reconciler<'_> {
    /// One sweep over the remote video catalog. A failure halts only the
    /// failing stem; every other stem still reaches its terminal stage.
    ///
    /// Re-running against unchanged remote state is a no-op for every stem
    /// that already has its transcript: the presence check alone guarantees
    /// idempotence, no run-local memory involved.
    pub async fn reconcile(
        &self,
        videos: &[RemoteFile],
        transcript_stems: &HashSet<String>,
    ) -> Vec<StemOutcome> {
        let mut outcomes = Vec::with_capacity(videos.len());

        for video in videos {
            let stem = stem_of(&video.name);

            if transcript_stems.contains(&stem) {
                info!(%stem, "transcript already remote, skipping video");
                self.progress
                    .emit(ProgressEvent::StemSkipped { stem: stem.clone() });
                outcomes.push(StemOutcome {
                    stem,
                    reached: AssetStage::Transcribed,
                    failure: None,
                });
                continue;
            }

            match self.advance(video, &stem).await {
                Ok(()) => outcomes.push(StemOutcome {
                    stem,
                    reached: AssetStage::Transcribed,
                    failure: None,
                }),
                Err(failure) => {
                    warn!(%stem, stage = %failure.stage, reason = %failure.reason, "stem stalled");
                    self.progress.emit(ProgressEvent::StemFailed {
                        stem: stem.clone(),
                        stage: failure.stage,
                        reason: failure.reason.clone(),
                    });
                    outcomes.push(StemOutcome {
                        stem,
                        reached: AssetStage::Pending,
                        failure: Some(failure),
                    });
                }
            }
        }

        outcomes
    }

    /// Run one stem through every stage up to its transcript upload.
    async fn advance(&self, video: &RemoteFile, stem: &str) -> Result<(), StageFailure> {
        let video_path = self.dirs.videos.join(&video.name);
        self.store
            .download(&video.id, &video_path)
            .await
            .map_err(|e| StageFailure::new(StageKind::Download, e))?;
        self.emit_advanced(stem, StageKind::Download);

        let audio_name = ArtifactKind::Audio.file_name(stem);
        let audio_path = self.dirs.audios.join(&audio_name);
        self.extractor
            .convert(&video_path, &audio_path)
            .await
            .map_err(|e| StageFailure::new(StageKind::ExtractAudio, e))?;
        self.store
            .upload(&audio_path, &self.folders.audios, ArtifactKind::Audio.mime())
            .await
            .map_err(|e| StageFailure::new(StageKind::ExtractAudio, e))?;

        // The source video is superseded by the uploaded audio.
        best_effort_delete(self.store, &video.id, &video.name).await;
        best_effort_remove_file(&video_path).await;
        self.emit_advanced(stem, StageKind::ExtractAudio);

        let transcript_name = ArtifactKind::Transcript.file_name(stem);
        let transcript_path = self.dirs.transcripts.join(&transcript_name);
        TranscribeStage::new(self.transcriber)
            .run(&audio_path, &transcript_path)
            .await
            .map_err(|e| StageFailure::new(StageKind::Transcribe, e))?;
        self.store
            .upload(
                &transcript_path,
                &self.folders.transcripts,
                ArtifactKind::Transcript.mime(),
            )
            .await
            .map_err(|e| StageFailure::new(StageKind::Transcribe, e))?;

        // The audio's remote id was assigned at upload time, so look the file
        // up by name instead of trusting a retained id.
        match self
            .store
            .find_by_name(&self.folders.audios, &audio_name)
            .await
        {
            Ok(Some(audio_id)) => best_effort_delete(self.store, &audio_id, &audio_name).await,
            Ok(None) => {}
            Err(e) => warn!(name = %audio_name, error = %e, "audio lookup failed, leaving remote copy"),
        }
        best_effort_remove_file(&audio_path).await;
        self.emit_advanced(stem, StageKind::Transcribe);

        Ok(())
    }

    fn emit_advanced(&self, stem: &str, stage: StageKind) {
        self.progress.emit(ProgressEvent::StemAdvanced {
            stem: stem.to_string(),
            stage,
        });
    }
}
