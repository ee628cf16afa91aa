//! The `vlmcap directory` command: batch captioning with a progress bar.

use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use vlmcap_core::{Captioner, Config, FileState, JobProgress};

use super::expand;

/// Arguments for the `directory` command.
#[derive(Args, Debug)]
pub struct DirectoryArgs {
    /// Directory containing the images (not searched recursively)
    pub directory: PathBuf,

    /// Model id (see `vlmcap models list`)
    #[arg(short, long)]
    pub model: String,

    /// Prompt key (see `vlmcap prompts`)
    #[arg(short, long, default_value = "detailed")]
    pub prompt: String,

    /// Extra text appended to the prompt
    #[arg(short, long)]
    pub append: Option<String>,

    /// Print the final job status as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// How often to refresh progress, in milliseconds
    #[arg(long, default_value_t = 250)]
    pub poll_ms: u64,
}

pub async fn execute(args: DirectoryArgs, config: &Config) -> anyhow::Result<()> {
    let directory = expand(&args.directory);
    let captioner = Captioner::new(config);

    captioner.start_service(&args.model).await?;
    let outcome = run_job(&captioner, &directory, &args).await;
    captioner.stop_service().await;

    let Some(progress) = outcome? else {
        return Ok(());
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&progress)?);
    } else {
        print_failures(&progress);
    }
    Ok(())
}

/// Run the job to completion (or Ctrl-C). Returns the final progress, or
/// `None` when there was nothing to do or the job was interrupted.
async fn run_job(
    captioner: &Captioner,
    directory: &std::path::Path,
    args: &DirectoryArgs,
) -> anyhow::Result<Option<JobProgress>> {
    let files = captioner.caption_directory(directory, &args.prompt, args.append.as_deref())?;
    if files.is_empty() {
        eprintln!("No images found in {}", directory.display());
        captioner.wait_for_job().await;
        return Ok(None);
    }

    let start = Instant::now();
    let pb = create_progress_bar(files.len() as u64);
    let poll = Duration::from_millis(args.poll_ms.max(10));

    let interrupted = follow_job(captioner, &pb, poll, tokio::signal::ctrl_c()).await?;

    if interrupted {
        pb.abandon_with_message("interrupted");
        captioner.stop_job();
        captioner.wait_for_job().await;
        eprintln!("Stopped. Captions written so far are kept.");
        return Ok(None);
    }

    captioner.wait_for_job().await;
    let progress = captioner.job_progress()?;
    pb.finish_with_message("done");
    print_summary(&progress, start.elapsed());
    Ok(Some(progress))
}

/// Update `pb` until the tracked job completes or `interrupt` resolves.
///
/// Returns whether the job was interrupted. `interrupt` is created once by
/// the caller so no signal is lost between polls.
async fn follow_job<F: Future>(
    captioner: &Captioner,
    pb: &ProgressBar,
    poll: Duration,
    interrupt: F,
) -> anyhow::Result<bool> {
    tokio::pin!(interrupt);

    loop {
        let progress = captioner.job_progress()?;
        pb.set_position(progress.processed_files as u64);
        if let Some(file) = current_file(&progress) {
            pb.set_message(file.to_string());
        }
        if progress.is_complete() {
            return Ok(false);
        }

        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = &mut interrupt => return Ok(true),
        }
    }
}

/// The file currently being captioned.
fn current_file(progress: &JobProgress) -> Option<&str> {
    progress
        .files
        .iter()
        .find(|f| f.state == FileState::Processing)
        .map(|f| f.file.as_str())
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb.set_message("loading...");
    pb
}

/// Print a formatted summary table after the job finishes.
fn print_summary(progress: &JobProgress, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        progress.processed_files as f64 / secs
    } else {
        0.0
    };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Captioned:    {:>8}", progress.success_count);
    if progress.error_count > 0 {
        eprintln!("    Failed:       {:>8}", progress.error_count);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", progress.total_files);
    eprintln!("    Duration:     {:>7.1}s", secs);
    eprintln!("    Rate:         {:>7.2} img/sec", rate);
    eprintln!("  ====================================");
}

fn print_failures(progress: &JobProgress) {
    let red = Style::new().for_stderr().red();
    for file in progress.files.iter().filter(|f| f.state == FileState::Error) {
        eprintln!("  {} {}: {}", red.apply_to("✗"), file.file, file.message);
    }
}
