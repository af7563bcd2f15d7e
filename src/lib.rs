// SplitStream Downloader - lib.rs

//! Segmented, resumable HTTP download engine.
//!
//! One [`DownloadJob`] fetches one URL into one file by opening several
//! concurrent ranged requests and writing each response into a disjoint
//! region of a shared staging file. Progress is persisted as a JSON resume
//! record so an interrupted transfer picks up byte-accurately in a later
//! process lifetime, and every lifecycle change is published on an event
//! channel for an external observer.

pub mod downloader;
pub mod events;
pub mod file_writer;
pub mod job;
pub mod plan;
pub mod progress;
pub mod source;
pub mod state;
pub mod worker;

pub use downloader::{DownloadJob, JobError, Outcome};
pub use events::DownloadEvent;
pub use job::{JobConfigError, JobOptions};
pub use state::ResumeRecord;
pub use worker::RetryPolicy;
