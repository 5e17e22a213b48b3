//! One run of a job: probe, plan, transfer, merge, install.
//!
//! Returns a `RunOutcome`; persisting the final status is the controller's job.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::aggregator::run_aggregator;
use super::publisher::Publisher;
use super::status::DownloadStatus;
use super::JobSettings;
use crate::error::JobError;
use crate::extract::{extract_archive, ExtractOutcome};
use crate::merge::{merge_parts, verify_complete};
use crate::planner::{prepare_chunks, remove_parts, Chunk, ChunkPlan};
use crate::state_db::StateDb;
use crate::transfer;
use crate::worker::{run_pool, JobSignals, PoolOutcome, PoolRequest, SuspendReason};

pub(crate) struct RunContext {
    pub job: String,
    pub url: String,
    pub file_name: String,
    pub download_dir: PathBuf,
    pub extract_dir: PathBuf,
    pub settings: JobSettings,
    pub db: StateDb,
    pub signals: Arc<JobSignals>,
    pub publisher: Publisher,
    /// Keep existing part files (resume from PAUSED or retry after FAILED).
    pub reuse_parts: bool,
}

impl RunContext {
    pub fn archive_path(&self) -> PathBuf {
        self.download_dir.join(&self.file_name)
    }
}

#[derive(Debug)]
pub(crate) enum RunOutcome {
    Completed { total: u64 },
    Suspended(SuspendReason),
    Failed(JobError),
}

enum Pass {
    Transferred { chunks: Vec<Chunk>, total: u64 },
    Suspended(SuspendReason),
}

async fn blocking<T, F>(f: F) -> Result<T, JobError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| JobError::Internal(format!("blocking task failed: {}", e)))
}

/// Cached total if known, otherwise probe the server and cache the answer.
async fn resolve_total(ctx: &RunContext) -> Result<u64, JobError> {
    let cached = ctx
        .db
        .get_total_bytes(&ctx.job)
        .await
        .map_err(JobError::store)?;
    if cached > 0 {
        tracing::debug!(job = %ctx.job, total = cached, "using cached size");
        return Ok(cached);
    }

    ctx.publisher.message("Checking file size");
    let url = ctx.url.clone();
    let opts = ctx.settings.transfer;
    let size = blocking(move || transfer::discover_size(&url, &opts))
        .await?
        .map_err(|e| JobError::Probe(format!("{:#}", e)))?;
    let total = size.ok_or(JobError::UnknownSize)?;

    ctx.db
        .set_total_bytes(&ctx.job, total)
        .await
        .map_err(JobError::store)?;
    tracing::info!(job = %ctx.job, total, "remote size");
    Ok(total)
}

async fn plan_chunks(ctx: &RunContext, total: u64, reuse: bool) -> Result<ChunkPlan, JobError> {
    let dir = ctx.download_dir.clone();
    let job = ctx.job.clone();
    let n = ctx.settings.chunk_count;
    blocking(move || prepare_chunks(total, n, &dir, &job, reuse))
        .await?
        .map_err(|e| JobError::PartFiles(format!("{:#}", e)))
}

/// Mirror the persisted pause flag into the run's signals, so a pause written to the
/// store by another process is honoured.
fn spawn_pause_watcher(
    db: StateDb,
    job: String,
    signals: Arc<JobSignals>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval.max(Duration::from_millis(50)));
        loop {
            tick.tick().await;
            match db.should_pause(&job).await {
                Ok(true) => {
                    tracing::info!(job = %job, "pause flag found in store");
                    signals.request_pause();
                    return;
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(job = %job, "pause flag poll failed: {:#}", e),
            }
        }
    })
}

async fn transfer_pass(ctx: &RunContext, reuse: bool) -> Result<Pass, JobError> {
    let total = resolve_total(ctx).await?;
    let plan = plan_chunks(ctx, total, reuse).await?;
    let downloaded = plan.downloaded();

    // Part files are authoritative; the stored aggregate follows them.
    ctx.db
        .set_bytes_read(&ctx.job, downloaded)
        .await
        .map_err(JobError::store)?;
    ctx.publisher.update(|s| {
        s.set_bytes(downloaded, total);
        s.set_status(Some(DownloadStatus::Downloading));
    });
    tracing::info!(
        job = %ctx.job,
        total,
        downloaded,
        chunks = plan.chunks.len(),
        "transfer pass"
    );

    if plan.is_complete() {
        return Ok(Pass::Transferred {
            chunks: plan.chunks,
            total,
        });
    }
    if let Some(reason) = ctx.signals.suspend_reason() {
        return Ok(Pass::Suspended(reason));
    }

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let aggregator = tokio::spawn(run_aggregator(
        rx,
        ctx.db.clone(),
        ctx.job.clone(),
        downloaded,
        total,
        ctx.settings.checkpoint_interval,
        ctx.publisher.clone(),
    ));

    let req = PoolRequest {
        url: ctx.url.clone(),
        job: ctx.job.clone(),
        dir: ctx.download_dir.clone(),
        chunks: plan.chunks,
        transfer: ctx.settings.transfer,
        retry: ctx.settings.retry,
    };
    let signals = Arc::clone(&ctx.signals);
    let pooled = blocking(move || run_pool(req, signals, tx)).await;
    if let Err(e) = aggregator.await {
        tracing::warn!(job = %ctx.job, "aggregator task failed: {}", e);
    }

    match pooled? {
        PoolOutcome::Completed(chunks) => Ok(Pass::Transferred { chunks, total }),
        PoolOutcome::Suspended(reason) => Ok(Pass::Suspended(reason)),
        PoolOutcome::Failed(e) => Err(e),
    }
}

/// The remote file no longer matches the plan: forget everything and start at byte 0.
async fn reset_for_restart(ctx: &RunContext) -> Result<(), JobError> {
    ctx.db
        .set_bytes_read(&ctx.job, 0)
        .await
        .map_err(JobError::store)?;
    ctx.db
        .set_total_bytes(&ctx.job, 0)
        .await
        .map_err(JobError::store)?;
    let dir = ctx.download_dir.clone();
    let job = ctx.job.clone();
    let n = ctx.settings.chunk_count;
    blocking(move || remove_parts(&dir, &job, n))
        .await?
        .map_err(|e| JobError::PartFiles(format!("{:#}", e)))?;
    ctx.publisher.update(|s| s.set_bytes(0, 0));
    Ok(())
}

async fn merge_and_install(ctx: &RunContext, chunks: Vec<Chunk>, total: u64) -> RunOutcome {
    if let Err(e) = verify_complete(&chunks, total) {
        return RunOutcome::Failed(e);
    }

    ctx.publisher.message("Merging chunks");
    let parts = ChunkPlan { total, chunks }.part_paths(&ctx.download_dir, &ctx.job);
    let archive = ctx.archive_path();
    let target = archive.clone();
    match blocking(move || merge_parts(&parts, &target)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) | Err(e) => return RunOutcome::Failed(e),
    }

    if ctx.signals.is_stop_requested() {
        return RunOutcome::Suspended(SuspendReason::Cancelled);
    }

    ctx.publisher.message("Installing");
    let root = ctx.extract_dir.clone();
    let source = archive.clone();
    let signals = Arc::clone(&ctx.signals);
    let extracted = blocking(move || extract_archive(&source, &root, signals.stop_flag())).await;
    match extracted {
        Ok(Ok(ExtractOutcome::Completed { entries })) => {
            tracing::info!(job = %ctx.job, entries, "installed");
        }
        Ok(Ok(ExtractOutcome::Stopped { .. })) => {
            return RunOutcome::Suspended(SuspendReason::Cancelled)
        }
        Ok(Err(e)) | Err(e) => return RunOutcome::Failed(e),
    }

    if let Err(e) = std::fs::remove_file(&archive) {
        tracing::warn!(archive = %archive.display(), "failed to remove archive: {}", e);
    }
    if let Err(e) = remove_parts(&ctx.download_dir, &ctx.job, ctx.settings.chunk_count) {
        tracing::warn!(job = %ctx.job, "failed to remove part files: {:#}", e);
    }
    RunOutcome::Completed { total }
}

/// Drive one run to a terminal outcome. A 416 resets progress and restarts once.
pub(crate) async fn execute(ctx: &RunContext) -> RunOutcome {
    let watcher = spawn_pause_watcher(
        ctx.db.clone(),
        ctx.job.clone(),
        Arc::clone(&ctx.signals),
        ctx.settings.checkpoint_interval,
    );
    let outcome = execute_inner(ctx).await;
    watcher.abort();
    outcome
}

async fn execute_inner(ctx: &RunContext) -> RunOutcome {
    let mut reuse = ctx.reuse_parts;
    let mut restarted = false;
    loop {
        match transfer_pass(ctx, reuse).await {
            Ok(Pass::Transferred { chunks, total }) => {
                return merge_and_install(ctx, chunks, total).await
            }
            Ok(Pass::Suspended(reason)) => return RunOutcome::Suspended(reason),
            Err(e) if e.is_range_not_satisfiable() && !restarted => {
                tracing::warn!(job = %ctx.job, "{}; restarting from byte 0", e);
                if let Err(e) = reset_for_restart(ctx).await {
                    return RunOutcome::Failed(e);
                }
                restarted = true;
                reuse = false;
            }
            Err(e) => return RunOutcome::Failed(e),
        }
    }
}
