//! Shared fixtures for the integration suite.

#![allow(dead_code)]

pub mod range_server;

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use packfetch_core::retry::RetryPolicy;
use packfetch_core::transfer::TransferOptions;
use packfetch_core::{DownloadSnapshot, JobController, JobRegistry, JobSettings, JobSpec, StateDb};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const JOB: &str = "pack";

/// Temp dirs, an on-disk store and a controller for job `pack`.
pub struct Harness {
    pub tmp: TempDir,
    pub db: StateDb,
    pub registry: Arc<JobRegistry>,
    pub controller: JobController,
}

pub fn fast_settings() -> JobSettings {
    JobSettings {
        chunk_count: 4,
        checkpoint_interval: Duration::from_millis(50),
        transfer: TransferOptions {
            connect_timeout: Duration::from_secs(5),
            low_speed_time: Duration::from_secs(10),
            buffer_size: None,
        },
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
        },
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(fast_settings()).await
    }

    pub async fn with_settings(settings: JobSettings) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let db = StateDb::open_at(tmp.path().join("state").join("state.db"))
            .await
            .unwrap();
        let registry = Arc::new(JobRegistry::new());
        let spec = JobSpec {
            name: JOB.to_string(),
            download_dir: tmp.path().join("downloads"),
            extract_dir: tmp.path().join("installed"),
        };
        let controller = JobController::new(spec, settings, db.clone(), Arc::clone(&registry))
            .await
            .unwrap();
        Harness {
            tmp,
            db,
            registry,
            controller,
        }
    }

    /// A second controller for the same job over the same store (a restarted process).
    pub async fn reopen(&self) -> JobController {
        JobController::new(
            self.controller.spec().clone(),
            fast_settings(),
            self.db.clone(),
            Arc::new(JobRegistry::new()),
        )
        .await
        .unwrap()
    }

    pub fn download_dir(&self) -> PathBuf {
        self.tmp.path().join("downloads")
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.tmp.path().join("installed")
    }

    pub fn part(&self, index: usize) -> PathBuf {
        packfetch_core::planner::part_path(&self.download_dir(), JOB, index)
    }

    pub fn part_lengths(&self) -> Vec<u64> {
        (0..4)
            .map(|i| std::fs::metadata(self.part(i)).map(|m| m.len()).unwrap_or(0))
            .collect()
    }
}

/// Wait (bounded) until the snapshot satisfies `pred`.
pub async fn wait_until<F>(controller: &JobController, pred: F) -> DownloadSnapshot
where
    F: Fn(&DownloadSnapshot) -> bool,
{
    let mut rx = controller.subscribe();
    let res = tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            {
                let snap = rx.borrow_and_update();
                if pred(&snap) {
                    return snap.clone();
                }
            }
            if rx.changed().await.is_err() {
                return controller.snapshot();
            }
        }
    })
    .await;
    res.expect("timed out waiting for snapshot condition")
}

fn build_zip(file_body: &[u8]) -> Vec<u8> {
    let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    w.add_directory("a/", opts).unwrap();
    w.start_file("a/b.txt", opts).unwrap();
    w.write_all(file_body).unwrap();
    w.finish().unwrap().into_inner()
}

/// A zip holding `a/` and `a/b.txt`, padded so the archive is exactly `len` bytes.
/// Returns the archive and the content of `a/b.txt`.
pub fn archive_of_len(len: usize) -> (Vec<u8>, Vec<u8>) {
    let overhead = build_zip(b"").len();
    assert!(len > overhead, "archive overhead is {} bytes", overhead);
    let content: Vec<u8> = (0..len - overhead).map(|i| b'a' + (i % 26) as u8).collect();
    let archive = build_zip(&content);
    assert_eq!(archive.len(), len);
    (archive, content)
}

pub fn read(path: impl AsRef<Path>) -> Vec<u8> {
    std::fs::read(path).unwrap()
}
