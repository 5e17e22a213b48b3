//! Chunk transfer error type for retry classification.

use std::fmt;

/// Error returned by a single chunk transfer attempt.
/// Kept separate from `JobError` so retries can be decided before the job sees it.
#[derive(Debug)]
pub enum ChunkError {
    /// Curl reported an error (timeout, connection, etc.).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// A 2xx response ended before the requested range was delivered.
    /// Bytes that did arrive are kept on disk; the next attempt resumes after them.
    PartialTransfer { expected: u64, received: u64 },
    /// Part file write failed (disk full, permission denied). Not retried.
    Storage(std::io::Error),
    /// Server answered with a full body (or more bytes than asked) instead of the requested range.
    RangeIgnored { status: u32 },
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::Curl(e) => write!(f, "{}", e),
            ChunkError::Http(code) => write!(f, "HTTP {}", code),
            ChunkError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            ChunkError::Storage(e) => write!(f, "storage: {}", e),
            ChunkError::RangeIgnored { status } => {
                write!(f, "server ignored the Range request (HTTP {})", status)
            }
        }
    }
}

impl std::error::Error for ChunkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChunkError::Curl(e) => Some(e),
            ChunkError::Storage(e) => Some(e),
            ChunkError::Http(_)
            | ChunkError::PartialTransfer { .. }
            | ChunkError::RangeIgnored { .. } => None,
        }
    }
}
