pub mod extract;
pub mod grade;
pub mod transcribe;

pub use extract::{AudioExtractor, FfmpegExtractor};
pub use grade::{ChatGrader, Grader, Provider, grade_or_error_marker};
pub use transcribe::{TranscribeStage, Transcriber, WhisperTranscriber};
