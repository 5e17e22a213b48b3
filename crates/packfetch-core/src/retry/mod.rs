//! Retry and backoff policy for chunk transfers.
//!
//! Error classification (timeouts, throttling, connection failures) and
//! exponential backoff decisions, shared by every chunk worker.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::ChunkError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
