use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::{LektorError, Result};

/// Remote folder ids for each artifact class. The videos folder is not
/// listed here because it arrives per run as a user-supplied URL.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFolders {
    pub audios: String,
    pub transcripts: String,
    pub reports: String,
    pub materials: String,
}

fn default_throttle() -> u64 {
    2
}

/// Pipeline configuration, loaded from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub folders: RemoteFolders,
    /// Root for the local scratch directories. Defaults to the user cache dir.
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,
    /// Pause between grader calls, in seconds, to stay under provider rate limits.
    #[serde(default = "default_throttle")]
    pub grader_throttle_secs: u64,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LektorError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn scratch_dirs(&self) -> ScratchDirs {
        let root = self
            .scratch_root
            .clone()
            .unwrap_or_else(default_scratch_root);
        ScratchDirs::new(&root)
    }
}

pub fn default_scratch_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("lektor")
}

/// Local scratch directories, one per artifact class. All stems share these
/// paths, which is safe only because stems are processed sequentially.
#[derive(Debug, Clone)]
pub struct ScratchDirs {
    pub videos: PathBuf,
    pub audios: PathBuf,
    pub transcripts: PathBuf,
    pub materials: PathBuf,
    pub reports: PathBuf,
}

impl ScratchDirs {
    pub fn new(root: &Path) -> Self {
        Self {
            videos: root.join("videos"),
            audios: root.join("audios"),
            transcripts: root.join("transcripts"),
            materials: root.join("materials"),
            reports: root.join("reports"),
        }
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [
            &self.videos,
            &self.audios,
            &self.transcripts,
            &self.materials,
            &self.reports,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Remove every regular file in `dir`, leaving the directory itself in place.
/// Failures are logged and skipped.
pub fn clean_dir(dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "could not remove stale file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_with_defaults() {
        let json = r#"{
            "folders": {
                "audios": "A",
                "transcripts": "T",
                "reports": "R",
                "materials": "M"
            }
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.folders.transcripts, "T");
        assert_eq!(config.grader_throttle_secs, 2);
        assert!(config.scratch_root.is_none());
    }

    #[test]
    fn clean_dir_removes_files_only() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("stale.txt");
        let sub = tmp.path().join("sub");
        std::fs::write(&file, "x").unwrap();
        std::fs::create_dir(&sub).unwrap();

        clean_dir(tmp.path());

        assert!(!file.exists());
        assert!(sub.exists());
    }

    #[test]
    fn clean_dir_tolerates_missing_dir() {
        clean_dir(Path::new("/nonexistent/lektor-test"));
    }
}
