use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::{LektorError, Result};
use crate::sentence::{Sentence, Word, assemble_sentences, format_transcript_tsv};

/// Produces the raw timestamped word stream for an audio file.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<Vec<Word>>;
}

/// Runs a [`Transcriber`], assembles sentences and writes the tab-separated
/// transcript table.
pub struct TranscribeStage<'a> {
    transcriber: &'a dyn Transcriber,
}

impl<'a> TranscribeStage<'a> {
    pub fn new(transcriber: &'a dyn Transcriber) -> Self {
        Self { transcriber }
    }

    /// A header-only table counts as a failure: a stem with no recognized
    /// speech must stall here rather than silently reach grading ungraded.
    pub async fn run(&self, audio: &Path, output: &Path) -> Result<Vec<Sentence>> {
        let words = self.transcriber.transcribe(audio).await?;
        let sentences = assemble_sentences(&words);
        tokio::fs::write(output, format_transcript_tsv(&sentences)).await?;

        if sentences.is_empty() {
            warn!(audio = %audio.display(), "no speech recognized");
            return Err(LektorError::EmptyTranscript {
                audio_path: audio.to_path_buf(),
            });
        }

        info!(output = %output.display(), sentences = sentences.len(), "transcript written");
        Ok(sentences)
    }
}

pub const MODEL_NAME: &str = "ggml-base.en.bin";
const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Download the whisper model into `model_dir` unless it is already cached.
pub async fn ensure_model(model_dir: &Path) -> Result<PathBuf> {
    let model_path = model_dir.join(MODEL_NAME);
    if model_path.exists() {
        debug!(path = %model_path.display(), "model already cached");
        return Ok(model_path);
    }

    tokio::fs::create_dir_all(model_dir).await?;
    let url = format!("{MODEL_BASE_URL}/{MODEL_NAME}");
    info!(%url, "downloading whisper model");

    let response = reqwest::get(&url)
        .await?
        .error_for_status()
        .map_err(|e| LektorError::ModelDownloadFailed {
            url: url.clone(),
            reason: e.to_string(),
        })?;
    let bytes = response.bytes().await?;
    tokio::fs::write(&model_path, &bytes).await?;

    Ok(model_path)
}

/// Whisper-backed transcriber with token-level timestamps.
pub struct WhisperTranscriber {
    model_path: PathBuf,
    use_gpu: bool,
}

impl WhisperTranscriber {
    pub async fn new(model_dir: &Path) -> Result<Self> {
        let model_path = ensure_model(model_dir).await?;
        Ok(Self {
            model_path,
            use_gpu: true,
        })
    }

    pub fn default_model_dir() -> PathBuf {
        crate::config::default_scratch_root().join("models")
    }

    fn load_samples(audio: &Path) -> Result<Vec<f32>> {
        let map_err = |e: hound::Error| LektorError::TranscriptionFailed {
            audio_path: audio.to_path_buf(),
            reason: e.to_string(),
        };
        let mut reader = hound::WavReader::open(audio).map_err(map_err)?;
        reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<Vec<f32>, hound::Error>>()
            .map_err(map_err)
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<Vec<Word>> {
        let whisper_err = |e: whisper_rs::WhisperError| LektorError::TranscriptionFailed {
            audio_path: audio.to_path_buf(),
            reason: e.to_string(),
        };

        let samples = Self::load_samples(audio)?;

        let mut ctx_params = WhisperContextParameters::new();
        ctx_params.use_gpu(self.use_gpu);

        let model_path =
            self.model_path
                .to_str()
                .ok_or_else(|| LektorError::TranscriptionFailed {
                    audio_path: audio.to_path_buf(),
                    reason: "model path contains invalid UTF-8".to_string(),
                })?;
        let ctx = WhisperContext::new_with_params(model_path, ctx_params).map_err(whisper_err)?;
        let mut state = ctx.create_state().map_err(whisper_err)?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 5 });
        params.set_token_timestamps(true);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        info!(audio = %audio.display(), samples = samples.len(), "running whisper");
        state.full(params, &samples).map_err(whisper_err)?;

        let mut tokens = Vec::new();
        let num_segments = state.full_n_segments();
        for i in 0..num_segments {
            let Some(segment) = state.get_segment(i) else {
                continue;
            };
            for t in 0..segment.n_tokens() {
                let Some(token) = segment.get_token(t) else {
                    continue;
                };
                let text = match token.to_str_lossy() {
                    Ok(s) => s.into_owned(),
                    Err(_) => continue,
                };
                // Skip whisper's special tokens
                let trimmed = text.trim();
                if trimmed.is_empty() || trimmed.starts_with('[') || trimmed.starts_with('<') {
                    continue;
                }
                let data = token.token_data();
                tokens.push(Word {
                    text,
                    start: data.t0 as f64 / 100.0,
                    end: data.t1 as f64 / 100.0,
                });
            }
        }

        Ok(merge_token_words(tokens))
    }
}

/// Merge whisper subword tokens into words. A token with leading whitespace
/// opens a new word; anything else continues the previous one.
fn merge_token_words(tokens: Vec<Word>) -> Vec<Word> {
    let mut words: Vec<Word> = Vec::new();
    for token in tokens {
        let opens_word = token.text.starts_with(char::is_whitespace);
        match words.last_mut() {
            Some(last) if !opens_word => {
                last.text.push_str(&token.text);
                last.end = token.end;
            }
            _ => words.push(Word {
                text: token.text.trim_start().to_string(),
                start: token.start,
                end: token.end,
            }),
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubTranscriber;

    fn token(text: &str, start: f64, end: f64) -> Word {
        Word {
            text: text.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn merge_joins_subword_tokens() {
        let tokens = vec![
            token(" trans", 0.0, 0.2),
            token("cription", 0.2, 0.5),
            token(" works", 0.6, 0.9),
        ];
        let words = merge_token_words(tokens);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "transcription");
        assert_eq!(words[0].start, 0.0);
        assert_eq!(words[0].end, 0.5);
        assert_eq!(words[1].text, "works");
    }

    #[test]
    fn merge_attaches_punctuation_to_previous_word() {
        let tokens = vec![token(" done", 0.0, 0.3), token(".", 0.3, 0.4)];
        let words = merge_token_words(tokens);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "done.");
        assert_eq!(words[0].end, 0.4);
    }

    #[test]
    fn merge_handles_leading_token_without_space() {
        let words = merge_token_words(vec![token("first", 0.0, 0.2)]);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "first");
    }

    #[tokio::test]
    async fn stage_writes_tsv_with_sentences() {
        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("lesson.txt");
        let transcriber = StubTranscriber::speaking("hello world");

        let stage = TranscribeStage::new(&transcriber);
        let sentences = stage.run(Path::new("fake.wav"), &output).await.unwrap();

        assert_eq!(sentences.len(), 1);
        let content = std::fs::read_to_string(&output).unwrap();
        assert!(content.starts_with("start_time\tend_time\tspeaker\ttranscript\n"));
        assert!(content.contains("hello world"));
    }

    #[tokio::test]
    async fn stage_rejects_header_only_output() {
        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("silent.txt");
        let transcriber = StubTranscriber::silent();

        let stage = TranscribeStage::new(&transcriber);
        let err = stage.run(Path::new("fake.wav"), &output).await.unwrap_err();

        assert!(matches!(err, LektorError::EmptyTranscript { .. }));
        // the header-only file is still on disk, mirroring the tool contract
        let content = std::fs::read_to_string(&output).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
