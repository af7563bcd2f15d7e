// SplitStream Downloader - worker.rs

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::file_writer::SharedFile;
use crate::plan::Segment;
use crate::progress::ProgressTracker;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server answered range request with status {0}")]
    Unsuccessful(StatusCode),
    #[error("stream ended {missing} bytes short")]
    Truncated { missing: u64 },
    #[error("file write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Local disk failures abort the job immediately; everything else is a
    /// transient network condition worth another attempt.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FetchError::Io(_))
    }
}

/// Restart schedule for one segment within a single `start` call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(1_000),
            factor: 1.5,
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Backoff after `failures` failed attempts: `base * factor^failures`,
    /// capped at `max_delay`.
    pub fn delay(&self, failures: u32) -> Duration {
        let scaled = self.base_delay.as_millis() as f64 * self.factor.powi(failures as i32);
        let capped = (scaled as u64).min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }
}

/// Streams one segment's byte range into the shared file at its absolute
/// offset, restarting from the last written byte on transient failures.
pub struct SegmentWorker {
    pub segment: Segment,
    pub url: Url,
    pub client: Client,
    pub file: SharedFile,
    pub tracker: Arc<ProgressTracker>,
    pub cancel: CancellationToken,
    pub retry: RetryPolicy,
}

impl SegmentWorker {
    /// Runs the segment to completion. Cancellation is not an error: the
    /// worker returns `Ok` as soon as it observes the token, including
    /// mid-backoff.
    pub async fn run(self) -> Result<(), FetchError> {
        let mut failures = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            match self.fetch_once().await {
                Ok(()) => return Ok(()),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    failures += 1;
                    if failures >= self.retry.max_attempts {
                        warn!(
                            segment = self.segment.index,
                            attempts = failures,
                            %err,
                            "segment exhausted its retry budget"
                        );
                        return Err(err);
                    }
                    let delay = self.retry.delay(failures);
                    debug!(
                        segment = self.segment.index,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        %err,
                        "segment retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(()),
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn fetch_once(&self) -> Result<(), FetchError> {
        let done = self.tracker.segment_progress(self.segment.index);
        let mut pos = self.segment.resume_start(done);
        if pos > self.segment.end {
            return Ok(());
        }

        let range = format!("bytes={}-{}", pos, self.segment.end);
        let mut response = self
            .client
            .get(self.url.clone())
            .header(header::RANGE, range)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::Unsuccessful(response.status()));
        }

        while let Some(buffer) = response.chunk().await? {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            self.file.write_at(pos, &buffer)?;
            pos += buffer.len() as u64;
            self.tracker.add(self.segment.index, buffer.len() as u64);
            self.tracker.poke();
        }

        if pos <= self.segment.end {
            return Err(FetchError::Truncated {
                missing: self.segment.end + 1 - pos,
            });
        }
        debug!(segment = self.segment.index, "segment finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_geometrically_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(1_500));
        assert_eq!(policy.delay(2), Duration::from_millis(2_250));
        assert_eq!(policy.delay(3), Duration::from_millis(3_375));
        assert_eq!(policy.delay(6), Duration::from_millis(10_000));
        assert_eq!(policy.delay(9), Duration::from_millis(10_000));
    }

    #[test]
    fn backoff_never_exceeds_the_cap() {
        let policy = RetryPolicy::default();
        for failures in 1..policy.max_attempts {
            let bound = (1000.0 * 1.5f64.powi(failures as i32)).min(10_000.0);
            assert!(policy.delay(failures).as_millis() as f64 <= bound);
        }
    }
}
