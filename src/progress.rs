// SplitStream Downloader - progress.rs

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::events::{DownloadEvent, EventSink};
use crate::state::{PersistError, ResumeRecord};

/// At most one `Progress` event per second.
pub const EMIT_INTERVAL_MS: u64 = 1_000;
/// At most one background state snapshot every five seconds.
pub const SNAPSHOT_INTERVAL_MS: u64 = 5_000;

/// Throttled reducer over the per-segment byte counters.
///
/// Each counter has exactly one writer (its worker), so the cells are plain
/// atomics with no lock. `poke` is called after every received buffer from
/// every worker; callers that lose the timestamp race simply return, and the
/// next buffer on any worker retries.
pub struct ProgressTracker {
    record: ResumeRecord,
    state_path: PathBuf,
    chunks: Vec<AtomicU64>,
    started: Instant,
    last_emit_ms: AtomicU64,
    last_save_ms: AtomicU64,
    last_speed_ms: AtomicU64,
    last_downloaded: AtomicU64,
    events: EventSink,
}

impl ProgressTracker {
    pub fn new(record: ResumeRecord, state_path: PathBuf, events: EventSink) -> Self {
        let chunks = record
            .downloaded_bytes_per_chunk
            .iter()
            .map(|&bytes| AtomicU64::new(bytes))
            .collect();
        let already_downloaded = record.downloaded_bytes_per_chunk.iter().sum();
        Self {
            record,
            state_path,
            chunks,
            started: Instant::now(),
            last_emit_ms: AtomicU64::new(0),
            last_save_ms: AtomicU64::new(0),
            last_speed_ms: AtomicU64::new(0),
            last_downloaded: AtomicU64::new(already_downloaded),
            events,
        }
    }

    pub fn add(&self, index: usize, bytes: u64) {
        self.chunks[index].fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn segment_progress(&self, index: usize) -> u64 {
        self.chunks[index].load(Ordering::Relaxed)
    }

    pub fn downloaded(&self) -> u64 {
        self.chunks.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    pub fn progress_vector(&self) -> Vec<u64> {
        self.chunks
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    /// Called from every worker after every buffer. Whoever wins the CAS on
    /// the emission timestamp emits the event; everyone else returns.
    pub fn poke(&self) {
        let now = self.elapsed_ms();
        let last = self.last_emit_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) >= EMIT_INTERVAL_MS
            && self
                .last_emit_ms
                .compare_exchange(last, now, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
        {
            self.emit_progress(now);
            self.maybe_snapshot(now);
        }
    }

    /// Current record with live per-segment counters filled in.
    pub fn snapshot(&self) -> ResumeRecord {
        let mut record = self.record.clone();
        record.downloaded_bytes_per_chunk = self.progress_vector();
        record
    }

    /// Synchronous write of the current state, used on the pause and failure
    /// paths where the job is about to unwind.
    pub async fn flush(&self) -> Result<(), PersistError> {
        self.snapshot().save(&self.state_path).await
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn emit_progress(&self, now: u64) {
        let downloaded = self.downloaded();
        let before = self.last_downloaded.swap(downloaded, Ordering::Relaxed);
        let since = self.last_speed_ms.swap(now, Ordering::Relaxed);
        let window_ms = now.saturating_sub(since).max(1);
        let speed = downloaded.saturating_sub(before) as f64 * 1000.0 / window_ms as f64;
        self.events.emit(DownloadEvent::Progress {
            downloaded,
            total: self.record.total_bytes,
            speed,
            job_id: self.record.job_id.clone(),
        });
    }

    fn maybe_snapshot(&self, now: u64) {
        let last = self.last_save_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) >= SNAPSHOT_INTERVAL_MS
            && self
                .last_save_ms
                .compare_exchange(last, now, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
        {
            self.snapshot().spawn_save(self.state_path.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracker(events: EventSink) -> ProgressTracker {
        let record = ResumeRecord {
            url: "http://example.com/f".to_string(),
            output_dir: "/tmp".to_string(),
            file_name: "f".to_string(),
            total_bytes: 1000,
            downloaded_bytes_per_chunk: vec![0, 0],
            num_connections: 2,
            job_id: "t".to_string(),
            state_dir: "/tmp".to_string(),
        };
        ProgressTracker::new(record, PathBuf::from("/tmp/t.json"), events)
    }

    #[test]
    fn counters_accumulate_per_segment() {
        let tracker = tracker(EventSink::new());
        tracker.add(0, 10);
        tracker.add(1, 5);
        tracker.add(0, 3);
        assert_eq!(tracker.segment_progress(0), 13);
        assert_eq!(tracker.segment_progress(1), 5);
        assert_eq!(tracker.downloaded(), 18);
        assert_eq!(tracker.snapshot().downloaded_bytes_per_chunk, vec![13, 5]);
    }

    #[test]
    fn emission_is_throttled_to_the_interval() {
        let events = EventSink::new();
        let mut rx = events.subscribe();
        let tracker = tracker(events);

        tracker.add(0, 100);
        tracker.poke();
        assert!(rx.try_recv().is_err(), "no event inside the first second");

        std::thread::sleep(Duration::from_millis(EMIT_INTERVAL_MS + 100));
        tracker.add(0, 100);
        tracker.poke();
        let event = rx.try_recv().expect("event after the interval elapsed");
        match event {
            DownloadEvent::Progress {
                downloaded, total, ..
            } => {
                assert_eq!(downloaded, 200);
                assert_eq!(total, 1000);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Immediately after an emission the window is closed again.
        tracker.poke();
        assert!(rx.try_recv().is_err());
    }
}
