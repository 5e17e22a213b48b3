//! packfetch core: resumable multi-chunk download of a zip archive, merge, and
//! zip-slip-safe installation, with progress persisted in SQLite so a job survives
//! pauses, failures and process restarts.

pub mod config;
pub mod error;
pub mod extract;
pub mod job;
pub mod logging;
pub mod merge;
pub mod planner;
pub mod retry;
pub mod state_db;
pub mod transfer;
pub mod worker;

pub use error::{ControlError, JobError};
pub use job::{
    DownloadSnapshot, DownloadStatus, JobController, JobRegistry, JobSettings, JobSpec, Progress,
};
pub use state_db::StateDb;
