//! Concatenate finished part files into the output archive.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::JobError;
use crate::planner::Chunk;

/// Check that every chunk is on disk at exactly its span length and that the spans
/// add up to `total`.
pub fn verify_complete(chunks: &[Chunk], total: u64) -> Result<(), JobError> {
    let downloaded: u64 = chunks.iter().map(|c| c.bytes_downloaded.min(c.len())).sum();
    let exact = chunks.iter().all(|c| c.bytes_downloaded == c.len());
    let span_sum: u64 = chunks.iter().map(Chunk::len).sum();
    if !exact || span_sum != total || chunks.is_empty() {
        return Err(JobError::IncompleteTransfer { downloaded, total });
    }
    Ok(())
}

/// Write `parts` back to back into `output`, replacing any previous file, and fsync.
///
/// Every part must exist; a missing one fails with `MissingChunk` before the output
/// is touched. Part files are never modified. Returns the bytes written.
pub fn merge_parts(parts: &[PathBuf], output: &Path) -> Result<u64, JobError> {
    if let Some(missing) = parts.iter().find(|p| !p.is_file()) {
        return Err(JobError::MissingChunk {
            path: missing.clone(),
        });
    }

    match fs::remove_file(output) {
        Ok(()) => tracing::debug!(output = %output.display(), "removed stale output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(JobError::Merge(e)),
    }

    let file = File::create(output).map_err(JobError::Merge)?;
    let mut out = BufWriter::new(file);
    let mut written = 0u64;
    for part in parts {
        let mut input = match File::open(part) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(JobError::MissingChunk { path: part.clone() })
            }
            Err(e) => return Err(JobError::Merge(e)),
        };
        written += io::copy(&mut input, &mut out).map_err(JobError::Merge)?;
    }
    let file = out
        .into_inner()
        .map_err(|e| JobError::Merge(e.into_error()))?;
    file.sync_all().map_err(JobError::Merge)?;

    tracing::info!(output = %output.display(), bytes = written, parts = parts.len(), "merged chunks");
    Ok(written)
}
