use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use serde::Deserialize;
use tracing::info;
use zip::ZipArchive;

use crate::config::{ScratchDirs, clean_dir};
use crate::error::{LektorError, Result};
use crate::progress::{Progress, ProgressEvent};
use crate::store::{ArtifactKind, RemoteStore, best_effort_remove_file, stem_of};

/// Mentor material class; decides the extractor and the tag attached to the
/// grading prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Slides,
    Notebook,
}

impl MaterialKind {
    pub fn tag(&self) -> &'static str {
        match self {
            MaterialKind::Slides => "slides",
            MaterialKind::Notebook => "notebook",
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match self {
            MaterialKind::Slides => matches!(ext.as_str(), "pptx" | "ppt"),
            MaterialKind::Notebook => ext == "ipynb",
        }
    }
}

/// Extract all shape text from a slide deck, one `=== Slide N ===` block per
/// slide. Slide decks are ZIP archives of Office Open XML; the text runs live
/// in `<a:t>` elements under `ppt/slides/slideN.xml`.
pub fn extract_slide_text(path: &Path) -> Result<String> {
    let material_err = |reason: String| LektorError::MaterialFailed {
        path: path.to_path_buf(),
        reason,
    };

    let file = std::fs::File::open(path)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| material_err(format!("cannot open archive: {e}")))?;

    let mut slide_entries: Vec<(u32, String)> = Vec::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| material_err(format!("cannot read archive entry: {e}")))?;
        let name = entry.name().to_string();
        if let Some(number) = slide_number(&name) {
            slide_entries.push((number, name));
        }
    }
    slide_entries.sort();

    let mut content: Vec<String> = Vec::new();
    for (index, (_, name)) in slide_entries.iter().enumerate() {
        let mut xml = String::new();
        archive
            .by_name(name)
            .map_err(|e| material_err(format!("cannot read slide {name}: {e}")))?
            .read_to_string(&mut xml)?;

        content.push(format!("=== Slide {} ===", index + 1));
        content.extend(slide_text_runs(&xml));
        content.push(String::new());
    }

    Ok(content.join("\n"))
}

/// Slide number from an archive entry name, or None for non-slide entries.
fn slide_number(entry_name: &str) -> Option<u32> {
    let rest = entry_name.strip_prefix("ppt/slides/slide")?;
    let digits = rest.strip_suffix(".xml")?;
    digits.parse().ok()
}

fn slide_text_runs(xml: &str) -> Vec<String> {
    static WHITESPACE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let mut reader = Reader::from_str(xml);
    let mut runs = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"a:t" => in_text = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"a:t" => in_text = false,
            Ok(Event::Text(e)) if in_text => {
                if let Ok(text) = e.unescape() {
                    let cleaned = WHITESPACE.replace_all(text.trim(), " ").into_owned();
                    if !cleaned.is_empty() {
                        runs.push(cleaned);
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    runs
}

#[derive(Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<NotebookCell>,
}

#[derive(Deserialize)]
struct NotebookCell {
    cell_type: String,
    #[serde(default)]
    source: CellSource,
}

/// Notebook cell source is either one string or a list of line strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum CellSource {
    One(String),
    Many(Vec<String>),
}

impl Default for CellSource {
    fn default() -> Self {
        CellSource::One(String::new())
    }
}

impl CellSource {
    fn text(&self) -> String {
        match self {
            CellSource::One(s) => s.clone(),
            CellSource::Many(lines) => lines.concat(),
        }
    }
}

/// Extract notebook cells: code cells verbatim, markdown cells with heading,
/// bold/italic and link syntax stripped to plain text.
pub fn extract_notebook_text(path: &Path) -> Result<String> {
    static HEADINGS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"#+\s*").expect("valid regex"));
    static EMPHASIS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*{1,2}(.*?)\*{1,2}").expect("valid regex"));
    static LINKS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[(.*?)\]\(.*?\)").expect("valid regex"));

    let raw = std::fs::read_to_string(path)?;
    let notebook: Notebook =
        serde_json::from_str(&raw).map_err(|e| LektorError::MaterialFailed {
            path: path.to_path_buf(),
            reason: format!("invalid notebook: {e}"),
        })?;

    let mut content: Vec<String> = Vec::new();
    for cell in &notebook.cells {
        match cell.cell_type.as_str() {
            "code" => {
                content.push("## CODE CELL ##".to_string());
                content.push(cell.source.text().trim().to_string());
                content.push("----".to_string());
            }
            "markdown" => {
                content.push("## MARKDOWN CELL ##".to_string());
                let cleaned = cell.source.text().trim().to_string();
                let cleaned = HEADINGS.replace_all(&cleaned, "");
                let cleaned = EMPHASIS.replace_all(&cleaned, "$1");
                let cleaned = LINKS.replace_all(&cleaned, "$1");
                content.push(cleaned.into_owned());
                content.push("----".to_string());
            }
            _ => {}
        }
    }

    Ok(content.join("\n"))
}

/// Stage, extract and upload mentor materials. Runs once per invocation,
/// ahead of the reconciler sweep; any failure here aborts the run.
pub async fn ingest_materials(
    store: &dyn RemoteStore,
    dirs: &ScratchDirs,
    materials_folder: &str,
    uploads: &[(MaterialKind, PathBuf)],
    progress: &Progress,
) -> Result<Vec<PathBuf>> {
    // Drop leftovers from earlier runs before staging anything.
    clean_dir(&dirs.materials);

    let mut produced = Vec::new();
    for (kind, source) in uploads {
        if !kind.accepts(source) {
            return Err(LektorError::MaterialFailed {
                path: source.clone(),
                reason: format!("unsupported file type for {}", kind.tag()),
            });
        }
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| LektorError::MaterialFailed {
                path: source.clone(),
                reason: "path has no file name".to_string(),
            })?;

        let staged = dirs.materials.join(&name);
        tokio::fs::copy(source, &staged).await?;

        let text = match kind {
            MaterialKind::Slides => extract_slide_text(&staged)?,
            MaterialKind::Notebook => extract_notebook_text(&staged)?,
        };

        let stem = stem_of(&name);
        let output = dirs.materials.join(ArtifactKind::Material.file_name(&stem));
        tokio::fs::write(&output, &text).await?;
        best_effort_remove_file(&staged).await;

        store
            .upload(&output, materials_folder, ArtifactKind::Material.mime())
            .await?;
        info!(%stem, kind = kind.tag(), "mentor material ingested");
        progress.emit(ProgressEvent::MaterialIngested { stem });
        produced.push(output);
    }

    Ok(produced)
}

/// Load extracted material texts from the scratch dir, keyed by stem.
pub fn load_material_texts(dir: &Path) -> Result<HashMap<String, String>> {
    let mut texts = HashMap::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(texts),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "txt") {
            let stem = stem_of(&path.file_name().unwrap_or_default().to_string_lossy());
            texts.insert(stem, std::fs::read_to_string(&path)?);
        }
    }
    Ok(texts)
}

/// Tag inference for the grading prompt, driven by the stem itself.
pub fn material_tag_for_stem(stem: &str) -> &'static str {
    let lower = stem.to_lowercase();
    if lower.contains("slide") {
        "slides"
    } else if lower.contains("notebook") {
        "notebook"
    } else {
        ""
    }
}
