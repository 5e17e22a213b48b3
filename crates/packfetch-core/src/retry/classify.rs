//! Classify HTTP status and curl errors into retry policy error kinds.

use super::error::ChunkError;
use super::policy::ErrorKind;

/// Classify an HTTP status code for retry decisions.
/// 416 is never retried: the planned range no longer matches the remote file.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

/// Classify a curl error for retry decisions.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

/// Classify a chunk error into an ErrorKind.
pub fn classify(e: &ChunkError) -> ErrorKind {
    match e {
        ChunkError::Curl(ce) => classify_curl_error(ce),
        ChunkError::Http(code) => classify_http_status(*code),
        ChunkError::PartialTransfer { .. } => ErrorKind::Connection,
        ChunkError::Storage(_) | ChunkError::RangeIgnored { .. } => ErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_and_503_throttled() {
        assert_eq!(classify_http_status(429), ErrorKind::Throttled);
        assert_eq!(classify_http_status(503), ErrorKind::Throttled);
    }

    #[test]
    fn http_5xx_retryable() {
        assert!(matches!(classify_http_status(500), ErrorKind::Http5xx(500)));
        assert!(matches!(classify_http_status(502), ErrorKind::Http5xx(502)));
    }

    #[test]
    fn http_4xx_other() {
        assert_eq!(classify_http_status(404), ErrorKind::Other);
        assert_eq!(classify_http_status(416), ErrorKind::Other);
    }

    #[test]
    fn short_body_is_retryable_storage_is_not() {
        let short = ChunkError::PartialTransfer { expected: 10, received: 4 };
        assert_eq!(classify(&short), ErrorKind::Connection);
        let disk = ChunkError::Storage(std::io::Error::new(std::io::ErrorKind::Other, "full"));
        assert_eq!(classify(&disk), ErrorKind::Other);
    }
}
