//! Chunk type and span planning.

/// One contiguous byte span `[start, end]` (inclusive) of the remote file,
/// plus how much of it is already on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
    /// Bytes already in this chunk's part file.
    pub bytes_downloaded: u64,
}

impl Chunk {
    /// Span length in bytes.
    pub fn len(&self) -> u64 {
        self.end + 1 - self.start
    }

    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.bytes_downloaded)
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_downloaded >= self.len()
    }

    /// First byte still missing.
    pub fn resume_offset(&self) -> u64 {
        self.start + self.bytes_downloaded
    }

    /// HTTP Range header value for what is still missing: `bytes=<start+k>-<end>`.
    pub fn range_header_value(&self) -> String {
        format!("bytes={}-{}", self.resume_offset(), self.end)
    }
}

/// Split `total` bytes into `n` spans.
///
/// `chunk_size = total / n`; every span but the last is exactly `chunk_size`, the last
/// absorbs the remainder and ends at `total - 1`. When `total < n` the count is lowered
/// to `total` so no span is empty. Returns an empty vec if `total` or `n` is 0.
pub fn plan_spans(total: u64, n: usize) -> Vec<Chunk> {
    if total == 0 || n == 0 {
        return Vec::new();
    }
    let n = (n as u64).min(total);
    let chunk_size = total / n;

    (0..n)
        .map(|i| {
            let start = i * chunk_size;
            let end = if i == n - 1 {
                total - 1
            } else {
                start + chunk_size - 1
            };
            Chunk {
                index: i as usize,
                start,
                end,
                bytes_downloaded: 0,
            }
        })
        .collect()
}
