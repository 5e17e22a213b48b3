//! Observable download status: what the UI (or the CLI) renders.

use serde::Serialize;

pub use crate::state_db::DownloadStatus;
use crate::state_db::JobStateRecord;

/// Completion percentage, or indeterminate while the total size is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Progress {
    Indeterminate,
    Percent(u8),
}

impl Progress {
    pub fn from_bytes(read: u64, total: u64) -> Self {
        if total == 0 {
            return Progress::Indeterminate;
        }
        let pct = (u128::from(read.min(total)) * 100 / u128::from(total)) as u8;
        Progress::Percent(pct)
    }

    pub fn percent(self) -> Option<u8> {
        match self {
            Progress::Indeterminate => None,
            Progress::Percent(p) => Some(p),
        }
    }
}

/// Point-in-time view of one job. Derived from the run and the store, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadSnapshot {
    pub job: String,
    /// `None` until the job has been started once.
    pub status: Option<DownloadStatus>,
    pub progress: Progress,
    pub bytes_read: u64,
    pub total_bytes: u64,
    pub message: String,
    pub error_message: Option<String>,
    pub download_url: Option<String>,
    pub output_file_name: Option<String>,
    /// The user closed the progress view (the run may still be going).
    pub dismissed: bool,
    /// COMPLETED and the completion has not been acknowledged yet.
    pub completion_notice_pending: bool,
}

impl DownloadSnapshot {
    pub fn idle(job: &str) -> Self {
        DownloadSnapshot {
            job: job.to_string(),
            status: None,
            progress: Progress::Percent(0),
            bytes_read: 0,
            total_bytes: 0,
            message: status_message(None, Progress::Percent(0)),
            error_message: None,
            download_url: None,
            output_file_name: None,
            dismissed: false,
            completion_notice_pending: false,
        }
    }

    /// Snapshot of what the store says, taken as-is.
    pub fn from_record(job: &str, rec: &JobStateRecord) -> Self {
        let mut snap = DownloadSnapshot::idle(job);
        snap.set_bytes(rec.bytes_read, rec.total_bytes);
        if rec.status == Some(DownloadStatus::Completed) {
            snap.set_bytes(rec.total_bytes, rec.total_bytes);
            snap.progress = Progress::Percent(100);
            snap.completion_notice_pending = !rec.completion_shown;
        }
        if rec.status == Some(DownloadStatus::Failed) {
            snap.error_message = rec.last_error.clone();
        }
        snap.set_status(rec.status);
        snap
    }

    pub fn set_bytes(&mut self, read: u64, total: u64) {
        self.bytes_read = read;
        self.total_bytes = total;
        self.progress = Progress::from_bytes(read, total);
    }

    /// Change status and refresh the message to match.
    pub fn set_status(&mut self, status: Option<DownloadStatus>) {
        self.status = status;
        self.message = status_message(status, self.progress);
    }

    pub fn is_downloading(&self) -> bool {
        self.status == Some(DownloadStatus::Downloading)
    }
}

/// Short human-readable text for a status.
pub fn status_message(status: Option<DownloadStatus>, progress: Progress) -> String {
    match (status, progress) {
        (None, _) => "Ready to download".to_string(),
        (Some(DownloadStatus::Downloading), Progress::Percent(p)) => format!("Downloading {}%", p),
        (Some(DownloadStatus::Downloading), Progress::Indeterminate) => {
            "Downloading (size unknown)".to_string()
        }
        (Some(DownloadStatus::Paused), Progress::Percent(p)) => format!("Paused at {}%", p),
        (Some(DownloadStatus::Paused), Progress::Indeterminate) => "Paused".to_string(),
        (Some(DownloadStatus::Completed), _) => "Download and install complete".to_string(),
        (Some(DownloadStatus::Failed), _) => "Download failed".to_string(),
        (Some(DownloadStatus::Cancelled), _) => "Download cancelled".to_string(),
    }
}
