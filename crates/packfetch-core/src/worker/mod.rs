//! Chunk worker pool.
//!
//! One OS thread per unfinished chunk, each streaming its byte range into its own
//! part file. Workers poll the job's pause/stop signals on every buffer and report
//! byte deltas to a single aggregator over a channel.

mod chunk;
mod part_file;
mod pool;
mod signals;

pub use chunk::{download_one_chunk, ChunkOutcome};
pub use part_file::PartFile;
pub use pool::{run_pool, PoolOutcome, PoolRequest};
pub use signals::{JobSignals, SuspendReason};
