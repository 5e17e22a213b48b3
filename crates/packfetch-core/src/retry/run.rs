//! Retry loop: run a closure until success or policy says stop.

use super::classify;
use super::error::ChunkError;
use super::policy::{RetryDecision, RetryPolicy};

/// Runs a closure until it succeeds or the retry policy says to stop.
/// On retryable failure, sleeps for the backoff duration then tries again.
/// `interrupted` is checked before each sleep; once it returns true the last error is returned.
pub fn run_with_retry<T, F, I>(policy: &RetryPolicy, interrupted: I, mut f: F) -> Result<T, ChunkError>
where
    F: FnMut() -> Result<T, ChunkError>,
    I: Fn() -> bool,
{
    let mut attempt = 1u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        if interrupted() {
                            return Err(e);
                        }
                        tracing::debug!(attempt, ?kind, delay_ms = d.as_millis() as u64, "retrying chunk: {}", e);
                        std::thread::sleep(d);
                        attempt += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn retries_5xx_until_success() {
        let calls = Cell::new(0);
        let res = run_with_retry(&fast_policy(5), || false, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(ChunkError::Http(503))
            } else {
                Ok(42)
            }
        });
        assert_eq!(res.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn range_not_satisfiable_is_not_retried() {
        let calls = Cell::new(0);
        let res: Result<(), _> = run_with_retry(&fast_policy(5), || false, || {
            calls.set(calls.get() + 1);
            Err(ChunkError::Http(416))
        });
        assert!(matches!(res, Err(ChunkError::Http(416))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn interruption_stops_retrying() {
        let calls = Cell::new(0);
        let res: Result<(), _> = run_with_retry(&fast_policy(5), || true, || {
            calls.set(calls.get() + 1);
            Err(ChunkError::Http(500))
        });
        assert!(res.is_err());
        assert_eq!(calls.get(), 1);
    }
}
