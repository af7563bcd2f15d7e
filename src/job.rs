// SplitStream Downloader - job.rs

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use url::Url;

use crate::state::ResumeRecord;
use crate::worker::RetryPolicy;

pub const DEFAULT_CONNECTIONS: usize = 8;

const FALLBACK_FILE_NAME: &str = "downloaded_file";
const MAX_FILE_NAME_LEN: usize = 100;

#[derive(Error, Debug)]
pub enum JobConfigError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("URL scheme {0:?} is not http or https")]
    UnsupportedScheme(String),
    #[error("connections must be at least 1")]
    NoConnections,
    #[error("resume progress has {got} entries but the job uses {expected} connections")]
    ProgressLengthMismatch { expected: usize, got: usize },
}

/// Caller-facing configuration for one download job. Only `url` and
/// `output_dir` are required; everything else has a sensible default.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub url: String,
    pub output_dir: PathBuf,
    /// Directory for the resume record. Defaults to `output_dir`.
    pub state_dir: Option<PathBuf>,
    /// Externally-supplied job id. Defaults to a time-derived string.
    pub job_id: Option<String>,
    pub connections: usize,
    /// Preferred file name; overrides anything derived from the URL or the
    /// server response.
    pub file_name: Option<String>,
    /// If non-zero, the metadata request is skipped on start.
    pub total_bytes: u64,
    /// Resume progress vector; length must match `connections`.
    pub downloaded: Option<Vec<u64>>,
    pub retry: RetryPolicy,
}

impl JobOptions {
    pub fn new(url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output_dir: output_dir.into(),
            state_dir: None,
            job_id: None,
            connections: DEFAULT_CONNECTIONS,
            file_name: None,
            total_bytes: 0,
            downloaded: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Reconstructs the options for a previously persisted job so that a new
    /// `start` picks up exactly where the old process left off.
    pub fn from_record(record: ResumeRecord) -> Self {
        Self {
            url: record.url,
            output_dir: PathBuf::from(record.output_dir),
            state_dir: Some(PathBuf::from(record.state_dir)),
            job_id: Some(record.job_id),
            connections: record.num_connections,
            file_name: Some(record.file_name),
            total_bytes: record.total_bytes,
            downloaded: Some(record.downloaded_bytes_per_chunk),
            retry: RetryPolicy::default(),
        }
    }

    pub(crate) fn build(self) -> Result<JobDescriptor, JobConfigError> {
        let url = Url::parse(&self.url).map_err(|source| JobConfigError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(JobConfigError::UnsupportedScheme(other.to_string())),
        }
        if self.connections == 0 {
            return Err(JobConfigError::NoConnections);
        }
        let downloaded = match self.downloaded {
            Some(progress) => {
                if progress.len() != self.connections {
                    return Err(JobConfigError::ProgressLengthMismatch {
                        expected: self.connections,
                        got: progress.len(),
                    });
                }
                progress
            }
            None => vec![0; self.connections],
        };

        let name_is_explicit = self.file_name.is_some();
        let file_name = self
            .file_name
            .as_deref()
            .map(sanitize_file_name)
            .or_else(|| file_name_from_url(&url).map(|name| sanitize_file_name(&name)))
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());

        let mut descriptor = JobDescriptor {
            url,
            output_dir: self.output_dir.clone(),
            state_dir: self.state_dir.unwrap_or(self.output_dir),
            job_id: self.job_id.unwrap_or_else(generated_job_id),
            connections: self.connections,
            file_name,
            name_is_explicit,
            total_bytes: self.total_bytes,
            downloaded,
            final_path: PathBuf::new(),
            temp_path: PathBuf::new(),
            state_path: PathBuf::new(),
        };
        descriptor.refresh_paths();
        Ok(descriptor)
    }
}

/// One download job's identity and on-disk layout. `file_name` (and the
/// derived paths) may still be refined once by the metadata request; the
/// rest never changes after construction.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub url: Url,
    pub output_dir: PathBuf,
    pub state_dir: PathBuf,
    pub job_id: String,
    pub connections: usize,
    pub file_name: String,
    pub name_is_explicit: bool,
    pub total_bytes: u64,
    pub downloaded: Vec<u64>,
    pub final_path: PathBuf,
    pub temp_path: PathBuf,
    pub state_path: PathBuf,
}

impl JobDescriptor {
    /// Recomputes `final_path`, `temp_path` and `state_path`. Must run after
    /// every `file_name` change and before any handle is opened.
    pub fn refresh_paths(&mut self) {
        self.final_path = self.output_dir.join(&self.file_name);
        let mut temp = self.final_path.clone().into_os_string();
        temp.push(".part");
        self.temp_path = PathBuf::from(temp);
        self.state_path = self.state_dir.join(format!("{}.json", self.job_id));
    }

    /// Adopts a server-suggested name unless the caller already chose one.
    pub fn refine_file_name(&mut self, candidate: &str) {
        if self.name_is_explicit {
            return;
        }
        let sanitized = sanitize_file_name(candidate);
        if !sanitized.is_empty() {
            self.file_name = sanitized;
            self.refresh_paths();
        }
    }

    pub fn record(&self) -> ResumeRecord {
        ResumeRecord {
            url: self.url.to_string(),
            output_dir: self.output_dir.to_string_lossy().into_owned(),
            file_name: self.file_name.clone(),
            total_bytes: self.total_bytes,
            downloaded_bytes_per_chunk: self.downloaded.clone(),
            num_connections: self.connections,
            job_id: self.job_id.clone(),
            state_dir: self.state_dir.to_string_lossy().into_owned(),
        }
    }
}

/// Replaces every character outside `[A-Za-z0-9._-]` with `_` and caps the
/// result at 100 characters, keeping the final extension intact.
pub fn sanitize_file_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    clamp_file_name(cleaned)
}

fn clamp_file_name(name: String) -> String {
    if name.len() <= MAX_FILE_NAME_LEN {
        return name;
    }
    // The sanitized name is pure ASCII, so byte indexing is safe here.
    match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot < MAX_FILE_NAME_LEN => {
            let ext = &name[dot..];
            format!("{}{}", &name[..MAX_FILE_NAME_LEN - ext.len()], ext)
        }
        _ => name[..MAX_FILE_NAME_LEN].to_string(),
    }
}

fn file_name_from_url(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map(str::to_string)
}

fn generated_job_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .to_string()
}
