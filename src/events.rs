// SplitStream Downloader - events.rs

use std::path::PathBuf;

use tokio::sync::broadcast;

/// Everything a job reports to the outside world.
///
/// Observers see a monotonic sequence per job: one `Started`, any number of
/// `Progress`, then exactly one of `Completed` / `Paused` / `Error`.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Started {
        total_bytes: u64,
        file_name: String,
        job_id: String,
    },
    Progress {
        downloaded: u64,
        total: u64,
        /// Instantaneous speed in bytes per second.
        speed: f64,
        job_id: String,
    },
    Paused,
    Completed {
        final_path: PathBuf,
    },
    Error {
        message: String,
    },
}

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Fan-out handle for job events. Sending never fails; events emitted while
/// nobody is subscribed are dropped.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<DownloadEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: DownloadEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}
