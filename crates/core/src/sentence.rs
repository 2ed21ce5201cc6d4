use serde::{Deserialize, Serialize};

/// A single recognized word with timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// A timestamped sentence assembled from the word stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentence {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
    pub text: String,
}

/// No diarization: every sentence is attributed to this placeholder.
pub const SPEAKER_PLACEHOLDER: &str = "SPEAKER";

/// A pause longer than this between words starts a new sentence.
pub const SENTENCE_GAP_SECS: f64 = 1.5;

pub const TRANSCRIPT_HEADER: &str = "start_time\tend_time\tspeaker\ttranscript";

fn is_terminal_punctuation(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| matches!(c, '.' | '!' | '?'))
}

/// Segment a word stream into sentences.
///
/// Greedy single pass, no lookahead: a sentence closes when the gap to the
/// next word exceeds [`SENTENCE_GAP_SECS`] or the next word is terminal
/// punctuation only; the boundary word opens the following sentence.
pub fn assemble_sentences(words: &[Word]) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut start = 0.0;
    let mut end = 0.0;

    for word in words {
        let text = word.text.trim();

        if current.is_empty() {
            start = word.start;
            end = word.end;
            current.push(text);
            continue;
        }

        let gap = word.start - end;
        if gap > SENTENCE_GAP_SECS || is_terminal_punctuation(text) {
            sentences.push(Sentence {
                start,
                end,
                speaker: SPEAKER_PLACEHOLDER.to_string(),
                text: current.join(" "),
            });
            current.clear();
            current.push(text);
            start = word.start;
            end = word.end;
        } else {
            current.push(text);
            end = word.end;
        }
    }

    if !current.is_empty() {
        sentences.push(Sentence {
            start,
            end,
            speaker: SPEAKER_PLACEHOLDER.to_string(),
            text: current.join(" "),
        });
    }

    sentences
}

/// Render sentences as the tab-separated transcript table. Timestamps are
/// seconds with two decimal places.
pub fn format_transcript_tsv(sentences: &[Sentence]) -> String {
    let mut out = String::from(TRANSCRIPT_HEADER);
    out.push('\n');
    for sentence in sentences {
        out.push_str(&format!(
            "{:.2}\t{:.2}\t{}\t{}\n",
            sentence.start, sentence.end, sentence.speaker, sentence.text
        ));
    }
    out
}
