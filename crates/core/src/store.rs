use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{LektorError, Result};

/// A file in a remote folder, as returned by a listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
}

pub const VIDEO_MIME: &str = "video/mp4";
pub const TEXT_MIME: &str = "text/plain";

/// The derived-artifact classes the pipeline produces. The kind decides the
/// remote file name and mime type for a given stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Audio,
    Transcript,
    Report,
    Material,
}

impl ArtifactKind {
    pub fn file_name(&self, stem: &str) -> String {
        match self {
            ArtifactKind::Audio => format!("{stem}.wav"),
            ArtifactKind::Transcript => format!("{stem}.txt"),
            ArtifactKind::Report => format!("report_{stem}.txt"),
            ArtifactKind::Material => format!("{stem}.txt"),
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio/wav",
            ArtifactKind::Transcript | ArtifactKind::Report | ArtifactKind::Material => TEXT_MIME,
        }
    }
}

/// The file name without its extension: the correlation key linking a video
/// to its audio, transcript, mentor material and report.
pub fn stem_of(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

/// Recover the stem from a report file name (`report_{stem}.txt`).
pub fn report_stem(name: &str) -> String {
    let stem = stem_of(name);
    stem.strip_prefix("report_").unwrap_or(&stem).to_string()
}

/// Remote object storage over folder hierarchies. Listing is the only source
/// of pipeline state; there is no uniqueness constraint on names, so callers
/// must dedupe.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list(&self, folder_id: &str, mime: &str) -> Result<Vec<RemoteFile>>;
    async fn download(&self, file_id: &str, dest: &Path) -> Result<()>;
    async fn upload(&self, local: &Path, folder_id: &str, mime: &str) -> Result<String>;
    async fn delete(&self, file_id: &str) -> Result<()>;
    async fn find_by_name(&self, folder_id: &str, name: &str) -> Result<Option<String>>;
}

/// Extract a folder id from a shared-folder URL. Accepts the `folders/<id>`
/// and `id=<id>` URL forms, or a bare id.
pub fn folder_id_from_url(url: &str) -> String {
    if let Some((_, rest)) = url.split_once("folders/") {
        return rest
            .split(['?', '&', '/'])
            .next()
            .unwrap_or(rest)
            .to_string();
    }
    if let Some((_, rest)) = url.split_once("id=") {
        return rest.split('&').next().unwrap_or(rest).to_string();
    }
    url.to_string()
}

/// Delete a remote file, logging and swallowing any failure. Leftover
/// intermediates cost storage only; correctness is carried by the terminal
/// artifacts, so a failed delete never aborts a stem.
pub async fn best_effort_delete(store: &dyn RemoteStore, file_id: &str, name: &str) {
    match store.delete(file_id).await {
        Ok(()) => debug!(%name, "deleted remote file"),
        Err(e) => warn!(%name, error = %e, "remote delete failed, continuing"),
    }
}

/// Remove a local file, logging and swallowing any failure.
pub async fn best_effort_remove_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "local cleanup failed, continuing");
    }
}

/// Delete remote files whose name was already seen earlier in the listing,
/// keeping the first occurrence. Returns how many duplicates were deleted.
pub async fn remove_duplicates_by_name(
    store: &dyn RemoteStore,
    folder_id: &str,
    mime: &str,
) -> Result<usize> {
    let files = store.list(folder_id, mime).await?;
    let mut seen: HashSet<String> = HashSet::new();
    let mut removed = 0;
    for file in files {
        if seen.insert(file.name.clone()) {
            continue;
        }
        match store.delete(&file.id).await {
            Ok(()) => {
                info!(name = %file.name, id = %file.id, "deleted duplicate file");
                removed += 1;
            }
            Err(e) => warn!(name = %file.name, error = %e, "could not delete duplicate"),
        }
    }
    Ok(removed)
}

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

pub const ACCESS_TOKEN_ENV: &str = "GDRIVE_ACCESS_TOKEN";

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

#[derive(Deserialize)]
struct CreatedFile {
    id: String,
}

/// Google Drive v3 implementation of [`RemoteStore`].
pub struct DriveStore {
    client: reqwest::Client,
    token: String,
}

impl DriveStore {
    /// Build a store from the `GDRIVE_ACCESS_TOKEN` environment variable.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var(ACCESS_TOKEN_ENV).map_err(|_| LektorError::MissingApiKey {
            env_var: ACCESS_TOKEN_ENV.to_string(),
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            token,
        })
    }
}

#[async_trait]
impl RemoteStore for DriveStore {
    async fn list(&self, folder_id: &str, mime: &str) -> Result<Vec<RemoteFile>> {
        let query = format!("'{folder_id}' in parents and mimeType='{mime}' and trashed=false");
        let list: FileList = self
            .client
            .get(format!("{API_BASE}/files"))
            .bearer_auth(&self.token)
            .query(&[("q", query.as_str()), ("fields", "files(id, name)")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.files)
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<()> {
        debug!(%file_id, dest = %dest.display(), "downloading remote file");
        let bytes = self
            .client
            .get(format!("{API_BASE}/files/{file_id}"))
            .bearer_auth(&self.token)
            .query(&[("alt", "media")])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| LektorError::DownloadFailed {
                name: file_id.to_string(),
                reason: e.to_string(),
            })?
            .bytes()
            .await?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }

    async fn upload(&self, local: &Path, folder_id: &str, mime: &str) -> Result<String> {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| LektorError::StoreError {
                reason: format!("upload path has no file name: {}", local.display()),
            })?;

        // Create the metadata first, then patch the content in.
        let created: CreatedFile = self
            .client
            .post(format!("{API_BASE}/files"))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "name": name, "parents": [folder_id] }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let data = tokio::fs::read(local).await?;
        self.client
            .patch(format!("{UPLOAD_BASE}/files/{}", created.id))
            .bearer_auth(&self.token)
            .query(&[("uploadType", "media")])
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(data)
            .send()
            .await?
            .error_for_status()?;

        info!(%name, folder = %folder_id, "uploaded file");
        Ok(created.id)
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        self.client
            .delete(format!("{API_BASE}/files/{file_id}"))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn find_by_name(&self, folder_id: &str, name: &str) -> Result<Option<String>> {
        let query = format!("'{folder_id}' in parents and name='{name}' and trashed=false");
        let list: FileList = self
            .client
            .get(format!("{API_BASE}/files"))
            .bearer_auth(&self.token)
            .query(&[("q", query.as_str()), ("fields", "files(id)")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryStore;

    #[test]
    fn folder_id_from_folders_url() {
        assert_eq!(
            folder_id_from_url("https://drive.example.com/drive/folders/abc123?usp=sharing"),
            "abc123"
        );
    }

    #[test]
    fn folder_id_from_query_url() {
        assert_eq!(
            folder_id_from_url("https://drive.example.com/open?id=xyz&foo=bar"),
            "xyz"
        );
    }

    #[test]
    fn bare_id_passes_through() {
        assert_eq!(folder_id_from_url("plain-id"), "plain-id");
    }

    #[test]
    fn artifact_names_follow_stem_convention() {
        assert_eq!(ArtifactKind::Audio.file_name("lessonA"), "lessonA.wav");
        assert_eq!(ArtifactKind::Transcript.file_name("lessonA"), "lessonA.txt");
        assert_eq!(
            ArtifactKind::Report.file_name("lessonA"),
            "report_lessonA.txt"
        );
    }

    #[test]
    fn report_stem_strips_prefix_and_extension() {
        assert_eq!(report_stem("report_lessonA.txt"), "lessonA");
        assert_eq!(report_stem("lessonA.txt"), "lessonA");
    }

    #[test]
    fn stem_of_handles_dots() {
        assert_eq!(stem_of("intro.v2.mp4"), "intro.v2");
        assert_eq!(stem_of("plain"), "plain");
    }

    #[tokio::test]
    async fn dedup_keeps_first_seen() {
        let store = MemoryStore::new();
        store.seed("R", "report_lessonC.txt", b"first");
        store.seed("R", "report_lessonC.txt", b"second");
        store.seed("R", "report_other.txt", b"x");

        let removed = remove_duplicates_by_name(&store, "R", TEXT_MIME)
            .await
            .unwrap();

        assert_eq!(removed, 1);
        let names: Vec<String> = store
            .list("R", TEXT_MIME)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names.len(), 2);
        // the survivor is the first occurrence
        let survivor = store.find_by_name("R", "report_lessonC.txt").await.unwrap();
        assert_eq!(store.content(&survivor.unwrap()), b"first");
    }

    #[tokio::test]
    async fn dedup_of_clean_folder_is_noop() {
        let store = MemoryStore::new();
        store.seed("T", "a.txt", b"a");
        store.seed("T", "b.txt", b"b");
        let removed = remove_duplicates_by_name(&store, "T", TEXT_MIME)
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn best_effort_delete_swallows_failure() {
        let store = MemoryStore::new();
        let id = store.seed("V", "clip.mp4", b"v");
        store.set_fail_deletes(true);
        best_effort_delete(&store, &id, "clip.mp4").await;
        // file survives, nothing panicked
        assert_eq!(store.list("V", VIDEO_MIME).await.unwrap().len(), 1);
    }
}
