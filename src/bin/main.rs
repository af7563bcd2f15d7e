// SplitStream Downloader - src/bin/main.rs
//
// Command-line shell around the engine: runs one job, renders progress,
// and maps Ctrl-C to pause so the transfer can be resumed later with
// --resume <job-id>.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing_subscriber::EnvFilter;

use splitstream::{DownloadEvent, DownloadJob, JobOptions, Outcome, ResumeRecord};

/// A segmented, resumable downloader.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of the file to download.
    #[arg(required_unless_present = "resume")]
    url: Option<String>,

    /// Directory the finished file lands in.
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Number of concurrent connections.
    #[arg(short, long, default_value_t = 8)]
    connections: usize,

    /// Directory for resume state (defaults to the output directory).
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Preferred file name, overriding the server's suggestion.
    #[arg(short = 'n', long)]
    file_name: Option<String>,

    /// Resume the job with this id from its state file.
    #[arg(long, conflicts_with_all = ["url", "file_name"])]
    resume: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let options = match build_options(&args).await {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let job = match DownloadJob::new(options) {
        Ok(job) => Arc::new(job),
        Err(err) => {
            eprintln!("could not set up download: {err}");
            return ExitCode::FAILURE;
        }
    };
    let job_id = job.job_id();

    let mut events = job.subscribe();
    let renderer = tokio::spawn(async move {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} {bytes_per_sec}")
                .expect("progress template"),
        );
        while let Ok(event) = events.recv().await {
            match event {
                DownloadEvent::Started {
                    total_bytes,
                    file_name,
                    ..
                } => {
                    println!("Downloading {file_name} ({total_bytes} bytes)");
                    bar.set_length(total_bytes);
                    bar.set_draw_target(ProgressDrawTarget::stderr());
                }
                DownloadEvent::Progress { downloaded, .. } => bar.set_position(downloaded),
                DownloadEvent::Paused => {
                    bar.abandon();
                    println!("Paused.");
                }
                DownloadEvent::Completed { final_path } => {
                    bar.finish();
                    println!("Saved to {}", final_path.display());
                }
                DownloadEvent::Error { message } => {
                    bar.abandon();
                    eprintln!("Download failed: {message}");
                }
            }
        }
    });

    let pauser = {
        let job = Arc::clone(&job);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                job.pause();
            }
        })
    };

    let code = match job.start().await {
        Ok(Outcome::Completed) => ExitCode::SUCCESS,
        Ok(Outcome::Paused) => {
            println!("Resume later with: splitstream --resume {job_id}");
            ExitCode::SUCCESS
        }
        // The renderer already printed the error event.
        Err(_) => ExitCode::FAILURE,
    };

    pauser.abort();
    let _ = pauser.await;
    drop(job);
    let _ = renderer.await;
    code
}

async fn build_options(args: &Args) -> Result<JobOptions, String> {
    if let Some(job_id) = &args.resume {
        let state_dir = args
            .state_dir
            .clone()
            .unwrap_or_else(|| args.output.clone());
        let state_path = state_dir.join(format!("{job_id}.json"));
        let record = ResumeRecord::load(&state_path)
            .await
            .map_err(|err| format!("cannot resume job {job_id}: {err}"))?;
        Ok(JobOptions::from_record(record))
    } else {
        let url = args.url.clone().expect("clap requires url without --resume");
        let mut options = JobOptions::new(url, args.output.clone());
        options.connections = args.connections.max(1);
        options.state_dir = args.state_dir.clone();
        options.file_name = args.file_name.clone();
        Ok(options)
    }
}
