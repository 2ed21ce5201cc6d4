//! In-memory collaborators for pipeline tests.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::config::{PipelineConfig, RemoteFolders};
use crate::error::{LektorError, Result};
use crate::sentence::Word;
use crate::stages::extract::AudioExtractor;
use crate::stages::grade::Grader;
use crate::stages::transcribe::Transcriber;
use crate::store::{RemoteFile, RemoteStore};

pub(crate) fn test_folders() -> RemoteFolders {
    RemoteFolders {
        audios: "AUDIOS".to_string(),
        transcripts: "TRANSCRIPTS".to_string(),
        reports: "REPORTS".to_string(),
        materials: "MATERIALS".to_string(),
    }
}

pub(crate) fn test_config(scratch_root: &Path) -> PipelineConfig {
    PipelineConfig {
        folders: test_folders(),
        scratch_root: Some(scratch_root.to_path_buf()),
        grader_throttle_secs: 0,
    }
}

/// Minimal slide deck with a single text run, for material tests.
pub(crate) fn write_minimal_pptx(path: &Path, text: &str) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    writer
        .start_file("ppt/slides/slide1.xml", options)
        .unwrap();
    writer
        .write_all(format!("<p:sld><a:t>{text}</a:t></p:sld>").as_bytes())
        .unwrap();
    writer.finish().unwrap();
}

#[derive(Default)]
struct StoreState {
    /// folder id -> files, in insertion order (listing order)
    folders: HashMap<String, Vec<RemoteFile>>,
    /// file id -> content
    contents: HashMap<String, Vec<u8>>,
    /// remote name -> times downloaded
    download_counts: HashMap<String, usize>,
}

/// In-memory [`RemoteStore`] with counters for idempotence assertions.
pub(crate) struct MemoryStore {
    state: Mutex<StoreState>,
    next_id: AtomicUsize,
    downloads: AtomicUsize,
    fail_deletes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            next_id: AtomicUsize::new(1),
            downloads: AtomicUsize::new(0),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn seed(&self, folder: &str, name: &str, content: &[u8]) -> String {
        let id = format!("f{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut state = self.state.lock().unwrap();
        state
            .folders
            .entry(folder.to_string())
            .or_default()
            .push(RemoteFile {
                id: id.clone(),
                name: name.to_string(),
            });
        state.contents.insert(id.clone(), content.to_vec());
        id
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn download_count_for(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .download_counts
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn content(&self, id: &str) -> Vec<u8> {
        self.state.lock().unwrap().contents[id].clone()
    }

    pub fn content_by_name(&self, folder: &str, name: &str) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        let file = state.folders[folder]
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("no {name} in {folder}"));
        state.contents[&file.id].clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list(&self, folder_id: &str, _mime: &str) -> Result<Vec<RemoteFile>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .folders
            .get(folder_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<()> {
        let content = {
            let mut state = self.state.lock().unwrap();
            let name = state
                .folders
                .values()
                .flatten()
                .find(|f| f.id == file_id)
                .map(|f| f.name.clone());
            if let Some(name) = name {
                *state.download_counts.entry(name).or_default() += 1;
            }
            state
                .contents
                .get(file_id)
                .cloned()
                .ok_or_else(|| LektorError::StoreError {
                    reason: format!("unknown file id {file_id}"),
                })?
        };
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(dest, content).await?;
        Ok(())
    }

    async fn upload(&self, local: &Path, folder_id: &str, _mime: &str) -> Result<String> {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| LektorError::StoreError {
                reason: "upload path has no file name".to_string(),
            })?;
        let content = tokio::fs::read(local).await?;
        Ok(self.seed(folder_id, &name, &content))
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(LektorError::StoreError {
                reason: "permission denied".to_string(),
            });
        }
        let mut state = self.state.lock().unwrap();
        let mut found = false;
        for files in state.folders.values_mut() {
            let before = files.len();
            files.retain(|f| f.id != file_id);
            found |= files.len() != before;
        }
        if !found {
            return Err(LektorError::StoreError {
                reason: format!("unknown file id {file_id}"),
            });
        }
        state.contents.remove(file_id);
        Ok(())
    }

    async fn find_by_name(&self, folder_id: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .folders
            .get(folder_id)
            .and_then(|files| files.iter().find(|f| f.name == name))
            .map(|f| f.id.clone()))
    }
}

/// Fake extractor: writes a marker file, fails for videos named `corrupt*`.
pub(crate) struct StubExtractor {
    calls: AtomicUsize,
}

impl StubExtractor {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioExtractor for StubExtractor {
    async fn convert(&self, video: &Path, audio: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = video
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with("corrupt") {
            return Err(LektorError::AudioExtractionFailed {
                video_path: video.to_path_buf(),
                reason: "stub conversion failure".to_string(),
            });
        }
        tokio::fs::write(audio, b"pcm").await?;
        Ok(())
    }
}

/// Fake transcriber emitting a fixed word stream.
pub(crate) struct StubTranscriber {
    words: Vec<Word>,
    calls: AtomicUsize,
}

impl StubTranscriber {
    /// One word per whitespace-separated token, half a second each.
    pub fn speaking(text: &str) -> Self {
        let words = text
            .split_whitespace()
            .enumerate()
            .map(|(i, token)| Word {
                text: token.to_string(),
                start: i as f64 * 0.5,
                end: i as f64 * 0.5 + 0.4,
            })
            .collect();
        Self {
            words,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn silent() -> Self {
        Self {
            words: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _audio: &Path) -> Result<Vec<Word>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.words.clone())
    }
}

/// Fake grader that echoes what it was given, or always fails.
pub(crate) struct StubGrader {
    fail: bool,
}

impl StubGrader {
    pub fn ok() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl Grader for StubGrader {
    async fn evaluate(
        &self,
        _transcript: &str,
        _checklist: &str,
        material_type: &str,
        material_text: &str,
    ) -> Result<String> {
        if self.fail {
            return Err(LektorError::GradeFailed {
                reason: "stub provider outage".to_string(),
            });
        }
        Ok(format!(
            "1a: ✅ [stub verdict]\nmaterial_type={material_type}\n{material_text}"
        ))
    }
}
