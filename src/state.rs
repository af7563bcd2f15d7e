// SplitStream Downloader - state.rs

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file is not a valid resume record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("record carries {got} progress entries for {expected} connections")]
    ProgressLengthMismatch { expected: usize, got: usize },
}

impl PersistError {
    /// A record that fails to parse or validate is simply unavailable; the
    /// caller starts fresh instead of failing the job.
    pub fn means_no_resume(&self) -> bool {
        matches!(
            self,
            PersistError::Malformed(_) | PersistError::ProgressLengthMismatch { .. }
        )
    }
}

/// Durable snapshot of a partially completed job. Serialized as JSON with
/// the field names the desktop shell reads, `uuid` included.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRecord {
    pub url: String,
    pub output_dir: String,
    pub file_name: String,
    pub total_bytes: u64,
    pub downloaded_bytes_per_chunk: Vec<u64>,
    pub num_connections: usize,
    #[serde(rename = "uuid")]
    pub job_id: String,
    pub state_dir: String,
}

impl ResumeRecord {
    pub async fn save(&self, path: &Path) -> Result<(), PersistError> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Best-effort background snapshot. A lost write costs a few seconds of
    /// re-downloaded progress on the next resume, never correctness, so the
    /// network pipeline is never blocked on it.
    pub fn spawn_save(self, path: PathBuf) {
        tokio::spawn(async move {
            if let Err(err) = self.save(&path).await {
                warn!(path = %path.display(), %err, "progress snapshot failed");
            }
        });
    }

    pub async fn load(path: &Path) -> Result<ResumeRecord, PersistError> {
        let json = tokio::fs::read_to_string(path).await?;
        let record: ResumeRecord = serde_json::from_str(&json)?;
        if record.downloaded_bytes_per_chunk.len() != record.num_connections {
            return Err(PersistError::ProgressLengthMismatch {
                expected: record.num_connections,
                got: record.downloaded_bytes_per_chunk.len(),
            });
        }
        Ok(record)
    }

    pub async fn remove(path: &Path) -> Result<(), PersistError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
