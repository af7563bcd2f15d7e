// SplitStream Downloader - downloader.rs

use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::events::{DownloadEvent, EventSink};
use crate::file_writer::SharedFile;
use crate::job::{JobConfigError, JobDescriptor, JobOptions};
use crate::plan;
use crate::progress::ProgressTracker;
use crate::source::{self, ProbeError};
use crate::state::{PersistError, ResumeRecord};
use crate::worker::{FetchError, RetryPolicy, SegmentWorker};

/// Idle deadline on segment response bodies.
const READ_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Config(#[from] JobConfigError),
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not persist resume state: {0}")]
    Persist(#[from] PersistError),
    #[error("segment {index} failed: {source}")]
    Segment { index: usize, source: FetchError },
    #[error("worker task aborted unexpectedly")]
    WorkerPanicked,
}

/// How a `start` call ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Paused,
}

/// One download job: probes the origin, fans out ranged workers over a
/// shared staging file, and finalizes or persists enough state to resume.
pub struct DownloadJob {
    client: Client,
    descriptor: Mutex<JobDescriptor>,
    cancel: Mutex<CancellationToken>,
    events: EventSink,
    retry: RetryPolicy,
}

impl DownloadJob {
    pub fn new(options: JobOptions) -> Result<Self, JobError> {
        let retry = options.retry;
        let descriptor = options.build()?;
        let client = build_client(descriptor.connections)?;
        Ok(Self {
            client,
            descriptor: Mutex::new(descriptor),
            cancel: Mutex::new(CancellationToken::new()),
            events: EventSink::new(),
            retry,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.events.subscribe()
    }

    pub fn job_id(&self) -> String {
        self.descriptor.lock().unwrap().job_id.clone()
    }

    /// Runs the job until it completes, pauses, or fails. Every terminal
    /// path also surfaces as an event, except that a failure racing with a
    /// `pause` call stays silent: cancellation unwinds into `Paused`.
    pub async fn start(&self) -> Result<Outcome, JobError> {
        match self.run().await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                if !self.cancel.lock().unwrap().is_cancelled() {
                    self.events.emit(DownloadEvent::Error {
                        message: err.to_string(),
                    });
                }
                Err(err)
            }
        }
    }

    /// Signals every worker to stop after its current buffer. Fire-and-
    /// forget: the `Paused` event arrives once all workers have returned
    /// and the final state snapshot is on disk.
    pub fn pause(&self) {
        self.cancel.lock().unwrap().cancel();
    }

    async fn run(&self) -> Result<Outcome, JobError> {
        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap() = cancel.clone();

        let mut descriptor = self.descriptor.lock().unwrap().clone();

        // A resume record already knows the size; only fresh jobs probe.
        if descriptor.total_bytes == 0 {
            let info = tokio::select! {
                _ = cancel.cancelled() => {
                    self.events.emit(DownloadEvent::Paused);
                    return Ok(Outcome::Paused);
                }
                result = source::inspect(&self.client, &descriptor.url) => result?,
            };
            descriptor.total_bytes = info.total_bytes;
            if let Some(name) = info.file_name.as_deref() {
                descriptor.refine_file_name(name);
            }
        }

        info!(
            job_id = %descriptor.job_id,
            total_bytes = descriptor.total_bytes,
            file = %descriptor.file_name,
            connections = descriptor.connections,
            "download starting"
        );
        self.events.emit(DownloadEvent::Started {
            total_bytes: descriptor.total_bytes,
            file_name: descriptor.file_name.clone(),
            job_id: descriptor.job_id.clone(),
        });

        tokio::fs::create_dir_all(&descriptor.output_dir).await?;
        tokio::fs::create_dir_all(&descriptor.state_dir).await?;

        descriptor.record().save(&descriptor.state_path).await?;
        *self.descriptor.lock().unwrap() = descriptor.clone();

        let file = SharedFile::open(&descriptor.temp_path, descriptor.total_bytes)?;
        let tracker = Arc::new(ProgressTracker::new(
            descriptor.record(),
            descriptor.state_path.clone(),
            self.events.clone(),
        ));

        let mut indices = Vec::new();
        let mut handles = Vec::new();
        for segment in plan::split(descriptor.total_bytes, descriptor.connections) {
            if segment.is_complete(tracker.segment_progress(segment.index)) {
                continue;
            }
            let worker = SegmentWorker {
                segment,
                url: descriptor.url.clone(),
                client: self.client.clone(),
                file: file.clone(),
                tracker: Arc::clone(&tracker),
                cancel: cancel.clone(),
                retry: self.retry,
            };
            indices.push(segment.index);
            handles.push(tokio::spawn(worker.run()));
        }

        let results = join_all(handles).await;

        // Keep the in-memory descriptor current so a later `start` on this
        // same job resumes instead of refetching.
        self.descriptor.lock().unwrap().downloaded = tracker.progress_vector();

        if cancel.is_cancelled() {
            if let Err(err) = tracker.flush().await {
                warn!(%err, "could not persist state after pause");
            }
            info!(job_id = %descriptor.job_id, "download paused");
            self.events.emit(DownloadEvent::Paused);
            return Ok(Outcome::Paused);
        }

        let mut failure = None;
        for (index, result) in indices.into_iter().zip(results) {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(source)) => {
                    failure.get_or_insert(JobError::Segment { index, source });
                }
                Err(_) => {
                    failure.get_or_insert(JobError::WorkerPanicked);
                }
            }
        }
        if let Some(err) = failure {
            // Temp and state files stay behind so the job can resume.
            if let Err(save_err) = tracker.flush().await {
                warn!(%save_err, "could not persist state after failure");
            }
            return Err(err);
        }

        drop(file);
        match tokio::fs::remove_file(&descriptor.final_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        tokio::fs::rename(&descriptor.temp_path, &descriptor.final_path).await?;
        ResumeRecord::remove(&descriptor.state_path).await?;

        info!(
            job_id = %descriptor.job_id,
            path = %descriptor.final_path.display(),
            "download complete"
        );
        self.events.emit(DownloadEvent::Completed {
            final_path: descriptor.final_path.clone(),
        });
        Ok(Outcome::Completed)
    }
}

/// One keep-alive pool per job, sized so all workers can hold a socket to
/// the origin at once, with the per-segment idle deadline baked in.
fn build_client(connections: usize) -> Result<Client, JobError> {
    Client::builder()
        .pool_max_idle_per_host(connections)
        .read_timeout(READ_TIMEOUT)
        .build()
        .map_err(JobError::Client)
}
