//! Types used by the state database.

use serde::Serialize;

/// Lifecycle status of a job run, stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadStatus {
    Downloading,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "downloading" => DownloadStatus::Downloading,
            "paused" => DownloadStatus::Paused,
            "completed" => DownloadStatus::Completed,
            "failed" => DownloadStatus::Failed,
            "cancelled" => DownloadStatus::Cancelled,
            _ => DownloadStatus::Failed,
        }
    }
}

/// Everything persisted for one job name. A missing row loads as the default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStateRecord {
    pub should_pause: bool,
    pub bytes_read: u64,
    pub total_bytes: u64,
    pub completion_shown: bool,
    pub status: Option<DownloadStatus>,
    pub last_error: Option<String>,
}
