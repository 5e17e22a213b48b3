//! Range-capable HTTP transfer client (libcurl via the `curl` crate).
//!
//! Metadata probing (HEAD, with a `Range: bytes=0-0` GET fallback for servers
//! that block HEAD) and streaming ranged GETs for chunk workers. Every call
//! blocks the current thread; use `spawn_blocking` from async code.

mod parse;
mod range;

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::str;
use std::time::Duration;

pub use parse::{parse_content_range, ContentRange};
pub use range::{get_range, RangeResponse};

/// Per-request curl settings derived from config.
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    pub connect_timeout: Duration,
    /// Abort when throughput stays below 1 KiB/s for this long.
    pub low_speed_time: Duration,
    pub buffer_size: Option<usize>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_time: Duration::from_secs(60),
            buffer_size: None,
        }
    }
}

/// Metadata from a probe: what the chunk planner needs to know about the resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadResult {
    /// Total size in bytes, if `Content-Length` is present.
    pub content_length: Option<u64>,
    /// True if server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
    /// Parsed `Content-Range`, if present (206 and 416 responses).
    pub content_range: Option<ContentRange>,
}

impl HeadResult {
    /// Full resource size: `Content-Range` total when present, else `Content-Length`.
    pub fn total_size(&self) -> Option<u64> {
        self.content_range
            .and_then(|r| r.total)
            .or(self.content_length)
            .filter(|n| *n > 0)
    }
}

fn base_easy(url: &str, opts: &TransferOptions) -> Result<curl::easy::Easy> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(opts.connect_timeout)?;
    Ok(easy)
}

/// Performs a HEAD request and returns parsed metadata.
pub fn probe(url: &str, opts: &TransferOptions) -> Result<HeadResult> {
    let headers: RefCell<Vec<String>> = RefCell::new(Vec::new());

    let mut easy = base_easy(url, opts)?;
    easy.nobody(true)?;
    easy.timeout(Duration::from_secs(30))?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.borrow_mut().push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform().context("HEAD request failed")?;
    }

    let code = easy.response_code().context("no response code")?;
    if !(200..300).contains(&code) {
        anyhow::bail!("HEAD {} returned HTTP {}", url, code);
    }

    Ok(parse::parse_headers(&headers.into_inner()))
}

/// Size probe for servers that reject HEAD: `GET` with `Range: bytes=0-0`, reading the
/// total from `Content-Range`. The body (at most one byte, or the start of a 200) is discarded.
pub fn probe_range(url: &str, opts: &TransferOptions) -> Result<HeadResult> {
    let headers: RefCell<Vec<String>> = RefCell::new(Vec::new());

    let mut easy = base_easy(url, opts)?;
    easy.range("0-0")?;
    easy.timeout(Duration::from_secs(30))?;

    let perform_result = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.borrow_mut().push(s.trim_end().to_string());
            }
            true
        })?;
        // Stop as soon as body bytes arrive; the headers are all we need.
        transfer.write_function(|_| Ok(0))?;
        transfer.perform()
    };
    if let Err(e) = perform_result {
        if !e.is_write_error() {
            return Err(e).context("range probe failed");
        }
    }

    let code = easy.response_code().context("no response code")?;
    if !(200..300).contains(&code) {
        anyhow::bail!("range probe {} returned HTTP {}", url, code);
    }
    let mut head = parse::parse_headers(&headers.into_inner());
    if code == 200 {
        // Range ignored: Content-Length is the full size but ranges are unusable.
        head.accept_ranges = false;
    } else {
        head.accept_ranges = true;
    }
    Ok(head)
}

/// Learn the total size of `url`: HEAD first, range probe when HEAD fails or has no length.
/// Returns `Ok(None)` when neither probe yields a positive size.
pub fn discover_size(url: &str, opts: &TransferOptions) -> Result<Option<u64>> {
    match probe(url, opts) {
        Ok(head) => {
            if !head.accept_ranges {
                tracing::warn!(url, "server does not advertise Accept-Ranges: bytes");
            }
            if let Some(total) = head.total_size() {
                return Ok(Some(total));
            }
            tracing::debug!(url, "HEAD carried no usable Content-Length, trying range probe");
        }
        Err(e) => tracing::debug!(url, "HEAD failed ({:#}), trying range probe", e),
    }
    let head = probe_range(url, opts)?;
    Ok(head.total_size())
}
