//! Job controller: lifecycle state machine for one named download+install job.
//!
//! `DOWNLOADING -> {PAUSED, FAILED, CANCELLED, COMPLETED}`, `PAUSED -> DOWNLOADING |
//! CANCELLED`, `FAILED -> DOWNLOADING`. A run is driven by a tokio task; the chunk
//! transfer itself happens on worker threads under `spawn_blocking`.

mod aggregator;
mod controller;
pub mod lock;
mod publisher;
mod registry;
mod run;
pub mod status;

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::PackfetchConfig;
use crate::retry::RetryPolicy;
use crate::transfer::TransferOptions;

pub use controller::JobController;
pub use registry::{JobRegistry, Registration};
pub use status::{DownloadSnapshot, DownloadStatus, Progress};

/// Identity and locations of a job. Part files and the merged archive live in
/// `download_dir`; the archive is installed into `extract_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,
    pub download_dir: PathBuf,
    pub extract_dir: PathBuf,
}

impl JobSpec {
    pub fn from_config(name: &str, cfg: &PackfetchConfig) -> Result<Self> {
        Ok(JobSpec {
            name: name.to_string(),
            download_dir: cfg.resolved_download_dir()?,
            extract_dir: cfg.resolved_extract_dir()?,
        })
    }
}

/// Tunables shared by every run of a job.
#[derive(Debug, Clone, Copy)]
pub struct JobSettings {
    pub chunk_count: usize,
    pub checkpoint_interval: Duration,
    pub transfer: TransferOptions,
    pub retry: RetryPolicy,
}

impl JobSettings {
    pub fn from_config(cfg: &PackfetchConfig) -> Self {
        JobSettings {
            chunk_count: cfg.chunk_count.max(1),
            checkpoint_interval: cfg.checkpoint_interval(),
            transfer: cfg.transfer_options(),
            retry: cfg.retry_policy(),
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        JobSettings::from_config(&PackfetchConfig::default())
    }
}
