//! Streaming ranged GET for chunk workers.

use std::cell::{Cell, RefCell};
use std::str;
use std::time::Duration;

use super::parse::parse_status_line;
use super::TransferOptions;
use crate::retry::ChunkError;

/// How a ranged GET ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeResponse {
    /// Body bytes accepted by the sink.
    pub received: u64,
    /// True if the sink asked to stop before the range was fully delivered.
    pub interrupted: bool,
}

/// GET `url` with `Range: bytes=<first>-<last>` and feed the body to `sink`.
///
/// `sink` returns `Ok(true)` to keep going, `Ok(false)` to stop early (the call then
/// returns `interrupted: true`), or an I/O error which aborts with `ChunkError::Storage`.
/// Error bodies (non-2xx) never reach the sink. A 2xx that ends short of the range is
/// `PartialTransfer`; a 200 for a range not starting at 0, or any body longer than the
/// range, is `RangeIgnored`.
pub fn get_range<F>(
    url: &str,
    first: u64,
    last: u64,
    opts: &TransferOptions,
    mut sink: F,
) -> Result<RangeResponse, ChunkError>
where
    F: FnMut(&[u8]) -> std::io::Result<bool>,
{
    let expected = last.saturating_sub(first) + 1;
    let status = Cell::new(0u32);
    let received = Cell::new(0u64);
    let interrupted = Cell::new(false);
    let range_ignored = Cell::new(false);
    let storage_error: RefCell<Option<std::io::Error>> = RefCell::new(None);

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(ChunkError::Curl)?;
    easy.follow_location(true).map_err(ChunkError::Curl)?;
    easy.connect_timeout(opts.connect_timeout)
        .map_err(ChunkError::Curl)?;
    easy.low_speed_limit(1024).map_err(ChunkError::Curl)?;
    easy.low_speed_time(opts.low_speed_time)
        .map_err(ChunkError::Curl)?;
    // Hard ceiling so a completely stuck transfer eventually fails.
    easy.timeout(Duration::from_secs(3600))
        .map_err(ChunkError::Curl)?;
    if let Some(size) = opts.buffer_size {
        easy.buffer_size(size).map_err(ChunkError::Curl)?;
    }
    easy.range(&format!("{}-{}", first, last))
        .map_err(ChunkError::Curl)?;

    let perform_result = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Some(code) = str::from_utf8(data).ok().and_then(parse_status_line) {
                    status.set(code);
                }
                true
            })
            .map_err(ChunkError::Curl)?;
        transfer
            .write_function(|data| {
                let code = status.get();
                if !(200..300).contains(&code) {
                    return Ok(data.len());
                }
                let len = data.len() as u64;
                if (code == 200 && first != 0) || received.get() + len > expected {
                    range_ignored.set(true);
                    return Ok(0);
                }
                match sink(data) {
                    Ok(true) => {
                        received.set(received.get() + len);
                        Ok(data.len())
                    }
                    Ok(false) => {
                        interrupted.set(true);
                        Ok(0)
                    }
                    Err(e) => {
                        storage_error.borrow_mut().replace(e);
                        Ok(0)
                    }
                }
            })
            .map_err(ChunkError::Curl)?;
        transfer.perform()
    };

    if let Err(e) = perform_result {
        if e.is_write_error() {
            if let Some(io_err) = storage_error.borrow_mut().take() {
                return Err(ChunkError::Storage(io_err));
            }
            if interrupted.get() {
                return Ok(RangeResponse {
                    received: received.get(),
                    interrupted: true,
                });
            }
            if range_ignored.get() {
                return Err(ChunkError::RangeIgnored {
                    status: status.get(),
                });
            }
        }
        return Err(ChunkError::Curl(e));
    }

    let code = easy.response_code().map_err(ChunkError::Curl)?;
    if !(200..300).contains(&code) {
        return Err(ChunkError::Http(code));
    }
    if received.get() != expected {
        return Err(ChunkError::PartialTransfer {
            expected,
            received: received.get(),
        });
    }

    Ok(RangeResponse {
        received: received.get(),
        interrupted: false,
    })
}
