use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{PipelineConfig, ScratchDirs, clean_dir};
use crate::error::Result;
use crate::materials::{
    MaterialKind, ingest_materials, load_material_texts, material_tag_for_stem,
};
use crate::progress::{Progress, ProgressEvent};
use crate::reconcile::{Reconciler, StemOutcome};
use crate::stages::extract::AudioExtractor;
use crate::stages::grade::{Grader, grade_or_error_marker};
use crate::stages::transcribe::Transcriber;
use crate::store::{
    ArtifactKind, RemoteStore, TEXT_MIME, VIDEO_MIME, folder_id_from_url,
    remove_duplicates_by_name, report_stem, stem_of,
};

/// Everything one run produced, threaded explicitly instead of living in
/// ambient state.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub outcomes: Vec<StemOutcome>,
    pub reports_written: Vec<String>,
    pub duplicates_removed: usize,
}

impl RunSummary {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }
}

/// Sequences one full pipeline run: material ingestion, the reconciler
/// sweep, duplicate removal, grading and report upload.
pub struct Orchestrator {
    store: Arc<dyn RemoteStore>,
    extractor: Arc<dyn AudioExtractor>,
    transcriber: Arc<dyn Transcriber>,
    grader: Arc<dyn Grader>,
    config: PipelineConfig,
    dirs: ScratchDirs,
    progress: Progress,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        extractor: Arc<dyn AudioExtractor>,
        transcriber: Arc<dyn Transcriber>,
        grader: Arc<dyn Grader>,
        config: PipelineConfig,
        progress: Progress,
    ) -> Self {
        let dirs = config.scratch_dirs();
        Self {
            store,
            extractor,
            transcriber,
            grader,
            config,
            dirs,
            progress,
        }
    }

    pub async fn run(
        &self,
        videos_folder_url: &str,
        checklist: &str,
        materials: &[(MaterialKind, PathBuf)],
    ) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "starting pipeline run");

        self.dirs.ensure()?;
        clean_dir(&self.dirs.videos);
        clean_dir(&self.dirs.audios);

        // Material ingestion has no per-item isolation: any failure aborts.
        ingest_materials(
            self.store.as_ref(),
            &self.dirs,
            &self.config.folders.materials,
            materials,
            &self.progress,
        )
        .await?;

        let videos_folder = folder_id_from_url(videos_folder_url);
        let videos = self.store.list(&videos_folder, VIDEO_MIME).await?;
        self.progress.emit(ProgressEvent::RunStarted {
            run_id,
            videos: videos.len(),
        });
        if videos.is_empty() {
            warn!(folder = %videos_folder, "no videos to process");
        }

        let transcript_stems: HashSet<String> = self
            .store
            .list(&self.config.folders.transcripts, TEXT_MIME)
            .await?
            .into_iter()
            .map(|f| stem_of(&f.name))
            .collect();

        let reconciler = Reconciler {
            store: self.store.as_ref(),
            extractor: self.extractor.as_ref(),
            transcriber: self.transcriber.as_ref(),
            folders: &self.config.folders,
            dirs: &self.dirs,
            progress: &self.progress,
        };
        let outcomes = reconciler.reconcile(&videos, &transcript_stems).await;

        // The remote store has no uniqueness constraint on names, so purge
        // duplicates left by crashed uploads before grading keys off them.
        let mut duplicates_removed = 0;
        for folder in [
            &self.config.folders.transcripts,
            &self.config.folders.reports,
            &self.config.folders.materials,
        ] {
            duplicates_removed +=
                remove_duplicates_by_name(self.store.as_ref(), folder, TEXT_MIME).await?;
        }
        if duplicates_removed > 0 {
            self.progress.emit(ProgressEvent::DuplicatesRemoved {
                count: duplicates_removed,
            });
        }

        let reports_written = self.grade_pending(checklist).await?;
        duplicates_removed += remove_duplicates_by_name(
            self.store.as_ref(),
            &self.config.folders.reports,
            TEXT_MIME,
        )
        .await?;

        let summary = RunSummary {
            run_id,
            outcomes,
            reports_written,
            duplicates_removed,
        };
        self.progress.emit(ProgressEvent::RunFinished {
            reports: summary.reports_written.len(),
            failures: summary.failures(),
        });
        info!(%run_id, reports = summary.reports_written.len(), "pipeline run finished");
        Ok(summary)
    }

    /// Grade every stem whose transcript reached the remote store but has no
    /// remote report yet. The remote catalog decides what gets graded (a
    /// stem that stalled before its transcript upload is not eligible, even
    /// if a partial local file exists); local copies only carry the content,
    /// and missing ones are fetched first so a run that only grades
    /// (everything already transcribed) still works.
    async fn grade_pending(&self, checklist: &str) -> Result<Vec<String>> {
        let folders = &self.config.folders;

        let transcripts = self.store.list(&folders.transcripts, TEXT_MIME).await?;
        for file in &transcripts {
            let local = self.dirs.transcripts.join(&file.name);
            if !local.exists() {
                self.store.download(&file.id, &local).await?;
                self.progress.emit(ProgressEvent::TranscriptFetched {
                    stem: stem_of(&file.name),
                });
            }
        }

        let report_stems: HashSet<String> = self
            .store
            .list(&folders.reports, TEXT_MIME)
            .await?
            .into_iter()
            .map(|f| report_stem(&f.name))
            .collect();

        let material_texts = load_material_texts(&self.dirs.materials)?;

        let mut written = Vec::new();
        let mut seen = HashSet::new();
        for file in &transcripts {
            let stem = stem_of(&file.name);
            if report_stems.contains(&stem) || !seen.insert(stem.clone()) {
                continue;
            }
            let path = self.dirs.transcripts.join(&file.name);

            let transcript = std::fs::read_to_string(&path)?;
            let tag = material_tag_for_stem(&stem);
            let material_text = material_texts.get(&stem).map(String::as_str).unwrap_or("");

            info!(%stem, "generating quality report");
            let report = grade_or_error_marker(
                self.grader.as_ref(),
                &transcript,
                checklist,
                tag,
                material_text,
            )
            .await;

            let report_path = self
                .dirs
                .reports
                .join(ArtifactKind::Report.file_name(&stem));
            tokio::fs::write(&report_path, &report).await?;
            self.store
                .upload(&report_path, &folders.reports, ArtifactKind::Report.mime())
                .await?;

            self.progress
                .emit(ProgressEvent::ReportWritten { stem: stem.clone() });
            written.push(stem);

            // Fixed pause between grader calls to stay under rate limits.
            tokio::time::sleep(Duration::from_secs(self.config.grader_throttle_secs)).await;
        }

        Ok(written)
    }
}
