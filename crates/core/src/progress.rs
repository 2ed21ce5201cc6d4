use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use uuid::Uuid;

use crate::reconcile::StageKind;

/// One event per discrete unit of work, so a front end can render status
/// without polling pipeline internals.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    RunStarted { run_id: Uuid, videos: usize },
    MaterialIngested { stem: String },
    StemSkipped { stem: String },
    StemAdvanced { stem: String, stage: StageKind },
    StemFailed { stem: String, stage: StageKind, reason: String },
    TranscriptFetched { stem: String },
    DuplicatesRemoved { count: usize },
    ReportWritten { stem: String },
    RunFinished { reports: usize, failures: usize },
}

/// Sending side of the progress stream. A closed or absent receiver is
/// ignored: progress reporting must never fail the pipeline.
#[derive(Clone)]
pub struct Progress {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl Progress {
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that discards every event.
    pub fn sink() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
