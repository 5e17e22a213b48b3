//! Durable per-job state (SQLite via sqlx).
//!
//! Keyed by job name: pause-requested flag, bytes-read checkpoint, cached
//! total size, completion-shown flag, and the last lifecycle status so a
//! restarted process can tell a paused run from a failed one.

mod db;
mod ops;
mod types;

pub use db::StateDb;
pub use types::{DownloadStatus, JobStateRecord};

#[cfg(test)]
pub(crate) use db::open_memory;
