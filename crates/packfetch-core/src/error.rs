//! Typed errors for job runs and controller commands.
//!
//! `JobError` is what ends a run in FAILED; its `Display` text is what the user sees.
//! `ControlError` is returned synchronously by controller commands.

use std::path::PathBuf;

use thiserror::Error;

use crate::retry::ChunkError;

/// Why a run failed. Pause and cancel are not errors (see `SuspendReason`).
#[derive(Debug, Error)]
pub enum JobError {
    /// Non-2xx response for a chunk request.
    #[error("server returned HTTP {status} for chunk {index}")]
    Http { index: usize, status: u32 },

    /// Network-level failure (timeout, reset, DNS) after retries were exhausted.
    #[error("network error on chunk {index}: {source}")]
    Transfer {
        index: usize,
        #[source]
        source: curl::Error,
    },

    /// A 2xx response ended before the requested range was delivered.
    #[error("connection closed early on chunk {index}: got {received} of {expected} bytes")]
    PartialTransfer {
        index: usize,
        expected: u64,
        received: u64,
    },

    /// Writing a part file failed.
    #[error("failed to write chunk {index}: {source}")]
    ChunkStorage {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    /// The server answered a ranged request with the whole file.
    #[error("server ignored the range request for chunk {index} (HTTP {status})")]
    RangeIgnored { index: usize, status: u32 },

    /// HTTP 416: the planned range no longer fits the remote file.
    #[error("requested range not satisfiable for chunk {index}")]
    RangeNotSatisfiable { index: usize },

    /// A chunk worker thread panicked.
    #[error("chunk worker {index} panicked")]
    WorkerPanicked { index: usize },

    /// Part files could not be inspected or removed before a transfer pass.
    #[error("failed to prepare part files: {0}")]
    PartFiles(String),

    /// Size probe succeeded but gave no positive length.
    #[error("could not determine the file size")]
    UnknownSize,

    /// Size probe request failed.
    #[error("size probe failed: {0}")]
    Probe(String),

    /// Transfer ended without every chunk at its full length.
    #[error("file not fully downloaded ({downloaded} of {total} bytes), please retry")]
    IncompleteTransfer { downloaded: u64, total: u64 },

    #[error("missing chunk file {}", .path.display())]
    MissingChunk { path: PathBuf },

    #[error("failed to merge chunks: {0}")]
    Merge(#[source] std::io::Error),

    /// An archive entry would land outside the extraction root.
    #[error("archive entry escapes the install directory: {entry}")]
    ExtractionSecurity { entry: String },

    #[error("extraction failed: {0}")]
    ExtractionIo(String),

    /// The state store could not be read or written.
    #[error("state store error: {0}")]
    Store(String),

    /// A background task died unexpectedly.
    #[error("internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Attribute a chunk failure to chunk `index`.
    pub fn from_chunk(index: usize, e: ChunkError) -> Self {
        match e {
            ChunkError::Http(416) => JobError::RangeNotSatisfiable { index },
            ChunkError::Http(status) => JobError::Http { index, status },
            ChunkError::Curl(source) => JobError::Transfer { index, source },
            ChunkError::PartialTransfer { expected, received } => JobError::PartialTransfer {
                index,
                expected,
                received,
            },
            ChunkError::Storage(source) => JobError::ChunkStorage { index, source },
            ChunkError::RangeIgnored { status } => JobError::RangeIgnored { index, status },
        }
    }

    pub fn store(e: anyhow::Error) -> Self {
        JobError::Store(format!("{:#}", e))
    }

    pub fn is_range_not_satisfiable(&self) -> bool {
        matches!(self, JobError::RangeNotSatisfiable { .. })
    }
}

/// Errors returned by controller commands (as opposed to run failures).
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("job {job} is already running")]
    AlreadyRunning { job: String },

    #[error("invalid download URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid output file name {0:?}")]
    InvalidFileName(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
