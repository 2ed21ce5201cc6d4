use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use lektor_core::{
    ChatGrader, DriveStore, FfmpegExtractor, MaterialKind, Orchestrator, PipelineConfig,
    Progress, ProgressEvent, Provider, StageKind, WhisperTranscriber,
};

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", secs / 60.0, secs % 60.0)
    }
}

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Default, ValueEnum)]
enum CliProvider {
    Grok,
    #[default]
    Openai,
    Gemini,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Grok => Provider::Grok,
            CliProvider::Openai => Provider::Openai,
            CliProvider::Gemini => Provider::Gemini,
        }
    }
}

#[derive(Parser)]
#[command(name = "lektor")]
#[command(
    about = "Pull instructional videos from a shared drive folder, transcribe them, and grade each transcript against a QC checklist"
)]
struct Cli {
    /// Shared folder URL (or bare id) containing the videos to review
    videos_folder: String,

    /// Pipeline configuration file
    #[arg(short, long, default_value = "config/config.json")]
    config: PathBuf,

    /// Checklist the grader scores transcripts against
    #[arg(long, default_value = "config/checklist.txt")]
    checklist: PathBuf,

    /// Slide deck accompanying the lessons (.pptx/.ppt)
    #[arg(long)]
    slides: Option<PathBuf>,

    /// Notebook accompanying the lessons (.ipynb)
    #[arg(long)]
    notebook: Option<PathBuf>,

    /// AI provider for report grading
    #[arg(short, long, default_value = "openai")]
    provider: CliProvider,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn render_event(pb: &ProgressBar, event: ProgressEvent) {
    let ok = style("✓").green().bold();
    match event {
        ProgressEvent::RunStarted { videos, .. } => {
            pb.println(format!("{ok} Found {videos} video(s) to reconcile"));
        }
        ProgressEvent::MaterialIngested { stem } => {
            pb.println(format!("{ok} Mentor material ingested: {stem}"));
        }
        ProgressEvent::StemSkipped { stem } => {
            pb.println(format!(
                "{ok} {stem} {}",
                style("(transcript already in drive)").dim()
            ));
        }
        ProgressEvent::StemAdvanced { stem, stage } => {
            let label = match stage {
                StageKind::Download => "downloaded",
                StageKind::ExtractAudio => "audio extracted",
                StageKind::Transcribe => "transcribed",
                StageKind::Grade => "graded",
            };
            pb.set_message(format!("{stem}: {stage}..."));
            pb.println(format!("{ok} {stem}: {label}"));
        }
        ProgressEvent::StemFailed {
            stem,
            stage,
            reason,
        } => {
            pb.println(format!(
                "{} {stem} stalled at {stage}: {reason}",
                style("✗").red().bold()
            ));
        }
        ProgressEvent::TranscriptFetched { stem } => {
            pb.println(format!("{ok} Fetched transcript: {stem}"));
        }
        ProgressEvent::DuplicatesRemoved { count } => {
            pb.println(format!("{ok} Removed {count} duplicate file(s)"));
        }
        ProgressEvent::ReportWritten { stem } => {
            pb.println(format!("{ok} Report generated: {stem}"));
        }
        ProgressEvent::RunFinished { reports, failures } => {
            pb.println(format!(
                "{ok} Run finished: {reports} report(s), {failures} failed stem(s)"
            ));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let provider: Provider = cli.provider.into();

    println!(
        "\n{}  {}\n",
        style("lektor").cyan().bold(),
        style("Video QC Reporter").dim()
    );

    let config = PipelineConfig::load(&cli.config)?;
    let checklist = std::fs::read_to_string(&cli.checklist)?;

    let mut materials: Vec<(MaterialKind, PathBuf)> = Vec::new();
    if let Some(slides) = cli.slides {
        materials.push((MaterialKind::Slides, slides));
    }
    if let Some(notebook) = cli.notebook {
        materials.push((MaterialKind::Notebook, notebook));
    }

    // Fail fast on missing credentials before any remote work starts.
    let store = match DriveStore::from_env() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };
    let grader = match ChatGrader::new(provider) {
        Ok(grader) => grader,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    println!("{} Checking model...", style("✓").green().bold());
    let transcriber = WhisperTranscriber::new(&WhisperTranscriber::default_model_dir()).await?;

    println!("{}", style("─".repeat(60)).dim());

    let (progress, mut events) = Progress::channel();
    let orchestrator = Orchestrator::new(
        Arc::new(store),
        Arc::new(FfmpegExtractor),
        Arc::new(transcriber),
        Arc::new(grader),
        config,
        progress,
    );

    let spinner = create_spinner("Starting run...");
    let printer = tokio::spawn({
        let spinner = spinner.clone();
        async move {
            while let Some(event) = events.recv().await {
                render_event(&spinner, event);
            }
        }
    });

    let total_start = Instant::now();
    let summary = orchestrator.run(&cli.videos_folder, &checklist, &materials).await;
    drop(orchestrator);
    let _ = printer.await;
    spinner.finish_and_clear();

    let summary = summary?;

    println!("{}", style("─".repeat(60)).dim());
    println!(
        "\n{} {} processed, {} report(s), {} failure(s), {} duplicate(s) removed",
        style("Done:").dim(),
        summary.outcomes.len(),
        summary.reports_written.len(),
        summary.failures(),
        summary.duplicates_removed,
    );
    for outcome in summary.outcomes.iter().filter(|o| o.is_failure()) {
        let failure = outcome.failure.as_ref().expect("filtered on failure");
        println!(
            "  {} {} stalled at {}: {}",
            style("✗").red().bold(),
            outcome.stem,
            failure.stage,
            failure.reason
        );
    }
    println!(
        "\n{} {}\n",
        style("Total time:").dim(),
        style(format_duration(total_start.elapsed())).cyan().bold()
    );

    Ok(())
}
