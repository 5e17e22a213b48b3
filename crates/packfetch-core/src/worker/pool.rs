//! Thread-per-chunk pool with cooperative suspension and fail-fast abort.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc::UnboundedSender;

use super::chunk::{download_one_chunk, ChunkOutcome};
use super::signals::{JobSignals, SuspendReason};
use crate::error::JobError;
use crate::planner::{part_path, Chunk};
use crate::retry::{classify, run_with_retry, ErrorKind, RetryPolicy};
use crate::transfer::TransferOptions;

/// Everything the pool needs for one transfer pass. Owned so it can move into threads.
#[derive(Debug, Clone)]
pub struct PoolRequest {
    pub url: String,
    pub job: String,
    pub dir: PathBuf,
    pub chunks: Vec<Chunk>,
    pub transfer: TransferOptions,
    pub retry: RetryPolicy,
}

/// Result of joining every worker.
#[derive(Debug)]
pub enum PoolOutcome {
    /// Every chunk is on disk at full length.
    Completed(Vec<Chunk>),
    /// Paused or cancelled; part files kept.
    Suspended(SuspendReason),
    /// The first fatal chunk error.
    Failed(JobError),
}

type WorkerResult = Result<ChunkOutcome, JobError>;

/// Run one worker thread per unfinished chunk and join them all.
///
/// The first worker to fail for good sets an internal abort flag so the others
/// suspend at their next buffer; the pool then reports that first error. Blocks
/// the calling thread; run it under `spawn_blocking`.
pub fn run_pool(
    req: PoolRequest,
    signals: Arc<JobSignals>,
    progress: UnboundedSender<u64>,
) -> PoolOutcome {
    let abort = Arc::new(AtomicBool::new(false));
    let first_failure: Arc<OnceLock<usize>> = Arc::new(OnceLock::new());

    let pending: Vec<Chunk> = req
        .chunks
        .iter()
        .filter(|c| !c.is_complete())
        .copied()
        .collect();
    tracing::debug!(
        job = %req.job,
        pending = pending.len(),
        total = req.chunks.len(),
        "starting chunk workers"
    );

    let handles: Vec<_> = pending
        .into_iter()
        .map(|chunk| {
            let url = req.url.clone();
            let path = part_path(&req.dir, &req.job, chunk.index);
            let opts = req.transfer;
            let policy = req.retry;
            let signals = Arc::clone(&signals);
            let abort = Arc::clone(&abort);
            let first_failure = Arc::clone(&first_failure);
            let progress = progress.clone();

            let handle = std::thread::spawn(move || -> WorkerResult {
                let should_stop =
                    || signals.suspend_reason().is_some() || abort.load(Ordering::SeqCst);
                let res = run_with_retry(&policy, &should_stop, || {
                    download_one_chunk(&url, &opts, &chunk, &path, &should_stop, &progress)
                });
                match res {
                    Ok(outcome) => Ok(outcome),
                    // Retryable error cut short by a pause/stop: a suspension, not a failure.
                    Err(e) if should_stop() && classify(&e) != ErrorKind::Other => {
                        tracing::debug!(chunk = chunk.index, "retry abandoned on suspend: {}", e);
                        Ok(ChunkOutcome::Suspended)
                    }
                    Err(e) => {
                        tracing::warn!(chunk = chunk.index, "chunk failed: {}", e);
                        if first_failure.set(chunk.index).is_ok() {
                            abort.store(true, Ordering::SeqCst);
                        }
                        Err(JobError::from_chunk(chunk.index, e))
                    }
                }
            });
            (chunk.index, handle)
        })
        .collect();

    let mut results: Vec<(usize, WorkerResult)> = Vec::with_capacity(handles.len());
    for (index, handle) in handles {
        let res = handle.join().unwrap_or_else(|_| {
            tracing::error!(chunk = index, "chunk worker panicked");
            let _ = first_failure.set(index);
            abort.store(true, Ordering::SeqCst);
            Err(JobError::WorkerPanicked { index })
        });
        results.push((index, res));
    }
    drop(progress);

    summarize(req.chunks, results, first_failure.get().copied(), &signals)
}

fn summarize(
    chunks: Vec<Chunk>,
    results: Vec<(usize, WorkerResult)>,
    first_failure: Option<usize>,
    signals: &JobSignals,
) -> PoolOutcome {
    let mut errors: Vec<(usize, JobError)> = Vec::new();
    let mut suspended = false;
    for (index, res) in results {
        match res {
            Ok(ChunkOutcome::Completed) => {}
            Ok(ChunkOutcome::Suspended) => suspended = true,
            Err(e) => errors.push((index, e)),
        }
    }

    if !errors.is_empty() {
        let pos = first_failure
            .and_then(|first| errors.iter().position(|(i, _)| *i == first))
            .unwrap_or(0);
        let (_, err) = errors.swap_remove(pos);
        return PoolOutcome::Failed(err);
    }
    if suspended {
        return PoolOutcome::Suspended(signals.suspend_reason().unwrap_or(SuspendReason::Paused));
    }

    let chunks = chunks
        .into_iter()
        .map(|c| Chunk {
            bytes_downloaded: c.len(),
            ..c
        })
        .collect();
    PoolOutcome::Completed(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::plan_spans;

    #[test]
    fn first_failure_is_reported() {
        let signals = JobSignals::new();
        let results = vec![
            (0, Ok(ChunkOutcome::Suspended)),
            (1, Err(JobError::Http { index: 1, status: 500 })),
            (2, Err(JobError::RangeNotSatisfiable { index: 2 })),
        ];
        match summarize(plan_spans(1000, 4), results, Some(2), &signals) {
            PoolOutcome::Failed(e) => assert!(e.is_range_not_satisfiable()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn any_suspension_suspends_the_pool() {
        let signals = JobSignals::new();
        signals.request_pause();
        let results = vec![(0, Ok(ChunkOutcome::Completed)), (1, Ok(ChunkOutcome::Suspended))];
        assert!(matches!(
            summarize(plan_spans(1000, 4), results, None, &signals),
            PoolOutcome::Suspended(SuspendReason::Paused)
        ));
    }

    #[test]
    fn all_complete_marks_every_chunk_full() {
        let signals = JobSignals::new();
        let results = vec![(0, Ok(ChunkOutcome::Completed)), (3, Ok(ChunkOutcome::Completed))];
        match summarize(plan_spans(1000, 4), results, None, &signals) {
            PoolOutcome::Completed(chunks) => {
                assert!(chunks.iter().all(Chunk::is_complete));
                assert_eq!(chunks.iter().map(|c| c.bytes_downloaded).sum::<u64>(), 1000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn nothing_pending_completes_without_threads() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let dir = tempfile::tempdir().unwrap();
        let chunks: Vec<Chunk> = plan_spans(100, 2)
            .into_iter()
            .map(|c| Chunk {
                bytes_downloaded: c.len(),
                ..c
            })
            .collect();
        let req = PoolRequest {
            url: "http://127.0.0.1:9/unused".into(),
            job: "pack".into(),
            dir: dir.path().to_path_buf(),
            chunks,
            transfer: TransferOptions::default(),
            retry: RetryPolicy::no_retry(),
        };
        assert!(matches!(
            run_pool(req, Arc::new(JobSignals::new()), tx),
            PoolOutcome::Completed(_)
        ));
    }
}
