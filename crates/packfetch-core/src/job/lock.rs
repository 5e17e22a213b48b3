//! Per-job advisory lock file, `<download_dir>/<job>.lock`.
//!
//! Held for the whole of a run so a second process cannot write the same part files.
//! The lock is released when the file handle closes, including on a crash.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

pub fn lock_path(dir: &Path, job: &str) -> PathBuf {
    dir.join(format!("{}.lock", job))
}

/// An exclusively locked job lock file.
#[derive(Debug)]
pub struct JobLock {
    file: File,
    path: PathBuf,
}

impl JobLock {
    /// Lock the job's lock file, creating `dir` and the file if needed.
    /// `Ok(None)` when another handle holds it.
    pub fn try_acquire(dir: &Path, job: &str) -> io::Result<Option<JobLock>> {
        fs::create_dir_all(dir)?;
        let path = lock_path(dir, job);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(JobLock { file, path })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::debug!(path = %self.path.display(), "unlock failed: {}", e);
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs4::lock_contended_error().raw_os_error()
}

/// True if some live handle (in this or another process) holds the job's lock.
/// A missing lock file means nobody does.
pub fn is_locked(dir: &Path, job: &str) -> bool {
    let path = lock_path(dir, job);
    let Ok(file) = OpenOptions::new().write(true).open(&path) else {
        return false;
    };
    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            false
        }
        Err(e) => is_contended(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_until_drop() {
        let dir = tempfile::tempdir().unwrap();
        let held = JobLock::try_acquire(dir.path(), "pack").unwrap().unwrap();
        assert_eq!(held.path(), lock_path(dir.path(), "pack"));
        assert!(is_locked(dir.path(), "pack"));
        assert!(JobLock::try_acquire(dir.path(), "pack").unwrap().is_none());
        assert!(JobLock::try_acquire(dir.path(), "other").unwrap().is_some());

        drop(held);
        assert!(!is_locked(dir.path(), "pack"));
        assert!(JobLock::try_acquire(dir.path(), "pack").unwrap().is_some());
    }

    #[test]
    fn missing_lock_file_is_unlocked() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_locked(&dir.path().join("absent"), "pack"));
    }
}
