//! Parse HTTP response header lines into HeadResult.

use super::HeadResult;

/// A parsed `Content-Range` value: `bytes <start>-<end>/<total>` or `bytes */<total>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// Inclusive byte span served; `None` for the unsatisfied form (`*`).
    pub span: Option<(u64, u64)>,
    /// Full resource size; `None` when the server sent `*`.
    pub total: Option<u64>,
}

/// Parse the value of a `Content-Range` header. Returns `None` on anything malformed.
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim();
    let rest = rest
        .get(..5)
        .filter(|unit| unit.eq_ignore_ascii_case("bytes"))
        .map(|_| rest[5..].trim_start())?;
    let (span, total) = rest.split_once('/')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };
    let span = match span.trim() {
        "*" => None,
        s => {
            let (a, b) = s.split_once('-')?;
            let a = a.trim().parse::<u64>().ok()?;
            let b = b.trim().parse::<u64>().ok()?;
            if b < a {
                return None;
            }
            Some((a, b))
        }
    };
    Some(ContentRange { span, total })
}

/// Parse collected header lines into HeadResult.
///
/// A status line (`HTTP/...`) resets everything seen so far, so after redirects only
/// the final response's headers count.
pub(crate) fn parse_headers(lines: &[String]) -> HeadResult {
    let mut out = HeadResult::default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            out = HeadResult::default();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                if let Ok(n) = value.parse::<u64>() {
                    out.content_length = Some(n);
                }
            } else if name.eq_ignore_ascii_case("accept-ranges") {
                out.accept_ranges = value.eq_ignore_ascii_case("bytes");
            } else if name.eq_ignore_ascii_case("content-range") {
                out.content_range = parse_content_range(value);
            }
        }
    }

    out
}

/// Status code from a status line such as `HTTP/1.1 206 Partial Content`.
pub(crate) fn parse_status_line(line: &str) -> Option<u32> {
    let rest = line.strip_prefix("HTTP/")?;
    rest.split_whitespace().nth(1)?.parse().ok()
}
