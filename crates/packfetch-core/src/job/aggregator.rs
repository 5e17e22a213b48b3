//! Progress aggregator: the single owner of a run's byte counter.
//!
//! Workers send byte deltas; the aggregator sums them, publishes progress and
//! checkpoints `bytes_read` to the store at most once per interval, plus once when
//! the last sender is gone.

use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedReceiver;

use super::publisher::Publisher;
use crate::state_db::StateDb;

/// Rate limiter for store checkpoints.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpointer {
    interval: Duration,
    last: Instant,
}

impl Checkpointer {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Checkpointer {
            interval,
            last: now,
        }
    }

    /// True (and the window restarts) if at least `interval` passed since the last checkpoint.
    pub(crate) fn due(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}

/// Run until every sender is dropped; returns the final byte count.
pub(crate) async fn run_aggregator(
    mut rx: UnboundedReceiver<u64>,
    db: StateDb,
    job: String,
    mut bytes: u64,
    total: u64,
    interval: Duration,
    publisher: Publisher,
) -> u64 {
    let mut checkpoints = Checkpointer::new(interval, Instant::now());
    while let Some(delta) = rx.recv().await {
        bytes += delta;
        while let Ok(more) = rx.try_recv() {
            bytes += more;
        }
        publisher.progress(bytes, total);
        if checkpoints.due(Instant::now()) {
            if let Err(e) = db.set_bytes_read(&job, bytes).await {
                tracing::warn!(job = %job, "progress checkpoint failed: {:#}", e);
            }
        }
    }
    if let Err(e) = db.set_bytes_read(&job, bytes).await {
        tracing::warn!(job = %job, "final progress checkpoint failed: {:#}", e);
    }
    tracing::debug!(job = %job, bytes, total, "aggregator finished");
    bytes
}
