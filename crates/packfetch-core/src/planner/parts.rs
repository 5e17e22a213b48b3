//! Part files: one per chunk, named `<job>.part<i>` inside the download directory.
//!
//! A part file's length is the authoritative record of how much of its chunk is done.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::chunk::{plan_spans, Chunk};

/// Deterministic part file path for chunk `index` of `job`.
pub fn part_path(dir: &Path, job: &str, index: usize) -> PathBuf {
    dir.join(format!("{}.part{}", job, index))
}

/// The chunk list for one run, with progress recovered from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub total: u64,
    pub chunks: Vec<Chunk>,
}

impl ChunkPlan {
    /// Bytes already on disk across all chunks.
    pub fn downloaded(&self) -> u64 {
        self.chunks.iter().map(|c| c.bytes_downloaded).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(Chunk::is_complete)
    }

    pub fn part_paths(&self, dir: &Path, job: &str) -> Vec<PathBuf> {
        self.chunks
            .iter()
            .map(|c| part_path(dir, job, c.index))
            .collect()
    }
}

fn file_len(path: &Path) -> io::Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Plan `n` chunks over `total` bytes and recover their progress.
///
/// With `resuming == false` any existing part files are deleted first and every chunk
/// starts at 0. Otherwise each existing part file's length becomes its chunk's
/// `bytes_downloaded`; a part file longer than its span is deleted and counted as 0.
/// Calling this twice without intervening writes gives the same plan.
pub fn prepare_chunks(
    total: u64,
    n: usize,
    dir: &Path,
    job: &str,
    resuming: bool,
) -> Result<ChunkPlan> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create download dir {}", dir.display()))?;
    if !resuming {
        remove_parts(dir, job, n)?;
    }

    let mut chunks = plan_spans(total, n);
    for chunk in &mut chunks {
        let path = part_path(dir, job, chunk.index);
        let len = file_len(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .unwrap_or(0);
        if len > chunk.len() {
            tracing::warn!(
                part = %path.display(),
                len,
                span = chunk.len(),
                "part file longer than its chunk, discarding"
            );
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            chunk.bytes_downloaded = 0;
        } else {
            chunk.bytes_downloaded = len;
        }
    }

    Ok(ChunkPlan { total, chunks })
}

/// Delete the part files of chunks `0..n`. Missing files are not an error.
pub fn remove_parts(dir: &Path, job: &str, n: usize) -> Result<()> {
    for index in 0..n {
        let path = part_path(dir, job, index);
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(part = %path.display(), "removed part file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("failed to remove {}", path.display()))
            }
        }
    }
    Ok(())
}
