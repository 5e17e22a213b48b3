//! Single-chunk ranged GET into the chunk's part file.

use std::path::Path;

use tokio::sync::mpsc::UnboundedSender;

use super::part_file::PartFile;
use crate::planner::Chunk;
use crate::retry::ChunkError;
use crate::transfer::{self, TransferOptions};

/// How one attempt at a chunk ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Part file holds the whole span.
    Completed,
    /// Stopped early because `should_stop` fired; bytes written so far are kept.
    Suspended,
}

/// Download whatever is still missing of `chunk` into `part_path`.
///
/// Progress is re-read from the part file length on every call, so a retry after a
/// short body resumes where the last attempt stopped. Requests
/// `Range: bytes=<start+k>-<end>` and appends at offset `k`. `should_stop` is polled
/// before every buffer is written; each written buffer's size goes to `progress`.
pub fn download_one_chunk<S>(
    url: &str,
    opts: &TransferOptions,
    chunk: &Chunk,
    part_path: &Path,
    should_stop: S,
    progress: &UnboundedSender<u64>,
) -> Result<ChunkOutcome, ChunkError>
where
    S: Fn() -> bool,
{
    let mut part = PartFile::open(part_path).map_err(ChunkError::Storage)?;
    let resume = Chunk {
        bytes_downloaded: part.len(),
        ..*chunk
    };
    if resume.is_complete() {
        return Ok(ChunkOutcome::Completed);
    }
    if should_stop() {
        return Ok(ChunkOutcome::Suspended);
    }

    tracing::debug!(
        chunk = chunk.index,
        range = %resume.range_header_value(),
        "requesting chunk"
    );

    let response = transfer::get_range(url, resume.resume_offset(), resume.end, opts, |data| {
        if should_stop() {
            return Ok(false);
        }
        part.append(data)?;
        // Receiver gone means the run is being torn down; the bytes are on disk regardless.
        let _ = progress.send(data.len() as u64);
        Ok(true)
    })?;

    if response.interrupted {
        tracing::debug!(chunk = chunk.index, on_disk = part.len(), "chunk suspended");
        return Ok(ChunkOutcome::Suspended);
    }
    part.sync().map_err(ChunkError::Storage)?;
    tracing::debug!(chunk = chunk.index, bytes = part.len(), "chunk complete");
    Ok(ChunkOutcome::Completed)
}
