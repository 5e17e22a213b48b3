//! `JobController`: commands and observation for one named job.

use anyhow::Result;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use super::lock::{self, JobLock};
use super::publisher::Publisher;
use super::registry::JobRegistry;
use super::run::{self, RunContext, RunOutcome};
use super::status::{DownloadSnapshot, DownloadStatus, Progress};
use super::{JobSettings, JobSpec};
use crate::error::ControlError;
use crate::planner::remove_parts;
use crate::state_db::StateDb;
use crate::worker::{JobSignals, SuspendReason};

struct LiveRun {
    signals: Arc<JobSignals>,
    done: watch::Receiver<bool>,
}

impl LiveRun {
    fn is_finished(&self) -> bool {
        *self.done.borrow()
    }
}

struct Inner {
    spec: JobSpec,
    settings: JobSettings,
    db: StateDb,
    registry: Arc<JobRegistry>,
    publisher: Publisher,
    live: Mutex<Option<LiveRun>>,
}

/// Drives one job through its lifecycle. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct JobController {
    inner: Arc<Inner>,
}

fn validate_url(raw: &str) -> Result<(), ControlError> {
    let parsed = url::Url::parse(raw).map_err(|e| ControlError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ControlError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {}", other),
        }),
    }
}

fn validate_file_name(name: &str) -> Result<(), ControlError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(ControlError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

fn log_store(what: &str, res: Result<()>) {
    if let Err(e) = res {
        tracing::warn!("state store update failed ({}): {:#}", what, e);
    }
}

impl JobController {
    /// Create a controller and restore its last known state from the store.
    pub async fn new(
        spec: JobSpec,
        settings: JobSettings,
        db: StateDb,
        registry: Arc<JobRegistry>,
    ) -> Result<Self> {
        let publisher = Publisher::new(DownloadSnapshot::idle(&spec.name));
        let controller = JobController {
            inner: Arc::new(Inner {
                spec,
                settings,
                db,
                registry,
                publisher,
                live: Mutex::new(None),
            }),
        };
        controller.restore().await?;
        Ok(controller)
    }

    pub fn spec(&self) -> &JobSpec {
        &self.inner.spec
    }

    fn name(&self) -> &str {
        &self.inner.spec.name
    }

    pub fn subscribe(&self) -> watch::Receiver<DownloadSnapshot> {
        self.inner.publisher.subscribe()
    }

    pub fn snapshot(&self) -> DownloadSnapshot {
        self.inner.publisher.snapshot()
    }

    /// COMPLETED and not yet acknowledged by `dismiss`.
    pub fn completion_notice_pending(&self) -> bool {
        let snap = self.snapshot();
        snap.status == Some(DownloadStatus::Completed) && snap.completion_notice_pending
    }

    /// Rebuild the snapshot from the store. A persisted DOWNLOADING with no live run
    /// here and an unlocked lock file means the process died mid-run; it is presented
    /// as PAUSED and resumes on start. With the lock held elsewhere it stays DOWNLOADING.
    pub async fn restore(&self) -> Result<()> {
        let live = self.inner.live.lock().await;
        if live.as_ref().is_some_and(|r| !r.is_finished()) {
            return Ok(());
        }
        let rec = self.inner.db.load(self.name()).await?;
        let mut snap = DownloadSnapshot::from_record(self.name(), &rec);
        if rec.status == Some(DownloadStatus::Downloading)
            && !self.inner.registry.is_live(self.name())
            && !self.locked_elsewhere()
        {
            tracing::info!(job = %self.name(), "recovering interrupted run as paused");
            snap.set_status(Some(DownloadStatus::Paused));
        }
        self.inner.publisher.update(|s| {
            snap.download_url = s.download_url.take();
            snap.output_file_name = s.output_file_name.take();
            *s = snap;
        });
        Ok(())
    }

    fn locked_elsewhere(&self) -> bool {
        lock::is_locked(&self.inner.spec.download_dir, self.name())
    }

    /// Lock the job for this process. `AlreadyRunning` if another process holds it.
    fn acquire_lock(&self) -> Result<JobLock, ControlError> {
        let dir = self.inner.spec.download_dir.clone();
        match JobLock::try_acquire(&dir, self.name()) {
            Ok(Some(lock)) => Ok(lock),
            Ok(None) => {
                tracing::info!(job = %self.name(), "job is locked by another process");
                Err(ControlError::AlreadyRunning {
                    job: self.name().to_string(),
                })
            }
            Err(e) => Err(ControlError::Other(anyhow::Error::new(e).context(format!(
                "failed to lock {}",
                lock::lock_path(&dir, self.name()).display()
            )))),
        }
    }

    /// Start (or resume, or retry) the job.
    ///
    /// Resumes from part files after PAUSED (or an interrupted DOWNLOADING). After
    /// FAILED, CANCELLED, COMPLETED or on first use the stored progress is cleared;
    /// FAILED still reuses intact part files. Fails with `AlreadyRunning` while a run is
    /// live and not winding down, here or in another process (the job's lock file is
    /// held); a run that is pausing or cancelling here is awaited first.
    pub async fn start(&self, url: &str, file_name: &str) -> Result<(), ControlError> {
        validate_url(url)?;
        validate_file_name(file_name)?;

        loop {
            let mut live = self.inner.live.lock().await;
            if let Some(run) = live.as_ref().filter(|r| !r.is_finished()) {
                if run.signals.suspend_reason().is_none() {
                    return Err(ControlError::AlreadyRunning {
                        job: self.name().to_string(),
                    });
                }
                let mut done = run.done.clone();
                drop(live);
                tracing::debug!(job = %self.name(), "waiting for suspending run to finish");
                let _ = done.wait_for(|finished| *finished).await;
                continue;
            }

            let mut registration =
                self.inner.registry.try_register(self.name()).ok_or_else(|| {
                    ControlError::AlreadyRunning {
                        job: self.name().to_string(),
                    }
                })?;
            registration.hold(self.acquire_lock()?);

            let db = &self.inner.db;
            let name = self.name();
            let rec = db.load(name).await?;
            let resuming = matches!(
                rec.status,
                Some(DownloadStatus::Paused) | Some(DownloadStatus::Downloading)
            );
            let reuse_parts = resuming || rec.status == Some(DownloadStatus::Failed);
            if !resuming {
                db.clear_state(name).await?;
                db.set_completion_shown(name, false).await?;
            }
            db.set_should_pause(name, false).await?;
            db.set_status(name, DownloadStatus::Downloading, None).await?;

            let (read, total) = if resuming {
                (rec.bytes_read, rec.total_bytes)
            } else {
                (0, 0)
            };
            self.inner.publisher.update(|s| {
                s.set_bytes(read, total);
                s.error_message = None;
                s.download_url = Some(url.to_string());
                s.output_file_name = Some(file_name.to_string());
                s.dismissed = false;
                s.completion_notice_pending = false;
                s.set_status(Some(DownloadStatus::Downloading));
            });
            tracing::info!(
                job = %name,
                url,
                file = file_name,
                resuming,
                reuse_parts,
                prior = ?rec.status,
                "starting run"
            );

            let signals = Arc::clone(registration.signals());
            let ctx = RunContext {
                job: name.to_string(),
                url: url.to_string(),
                file_name: file_name.to_string(),
                download_dir: self.inner.spec.download_dir.clone(),
                extract_dir: self.inner.spec.extract_dir.clone(),
                settings: self.inner.settings,
                db: db.clone(),
                signals: Arc::clone(&signals),
                publisher: self.inner.publisher.clone(),
                reuse_parts,
            };
            let (done_tx, done_rx) = watch::channel(false);
            let this = self.clone();
            tokio::spawn(async move {
                let outcome = run::execute(&ctx).await;
                // Holding `live` orders the final write against a concurrent cancel.
                let _live = this.inner.live.lock().await;
                this.finish_run(&ctx, outcome).await;
                drop(registration);
                done_tx.send_replace(true);
            });

            *live = Some(LiveRun {
                signals,
                done: done_rx,
            });
            return Ok(());
        }
    }

    /// Persist the outcome of a run and publish the final snapshot.
    async fn finish_run(&self, ctx: &RunContext, outcome: RunOutcome) {
        let db = &self.inner.db;
        let name = self.name();
        // Cancel is unconditional, even if the run finished or failed meanwhile.
        let outcome = if ctx.signals.is_stop_requested() {
            RunOutcome::Suspended(SuspendReason::Cancelled)
        } else {
            outcome
        };

        match outcome {
            RunOutcome::Completed { total } => {
                log_store("clear", db.clear_state(name).await);
                log_store("completion", db.set_completion_shown(name, false).await);
                log_store(
                    "status",
                    db.set_status(name, DownloadStatus::Completed, None).await,
                );
                self.inner.publisher.update(|s| {
                    s.set_bytes(total, total);
                    s.progress = Progress::Percent(100);
                    s.completion_notice_pending = true;
                    s.set_status(Some(DownloadStatus::Completed));
                });
                tracing::info!(job = %name, total, "job completed");
            }
            RunOutcome::Suspended(SuspendReason::Paused) => {
                log_store("status", db.set_status(name, DownloadStatus::Paused, None).await);
                self.inner
                    .publisher
                    .update(|s| s.set_status(Some(DownloadStatus::Paused)));
                tracing::info!(job = %name, "job paused");
            }
            RunOutcome::Suspended(SuspendReason::Cancelled) => {
                self.discard_progress(Some(ctx.archive_path())).await;
                tracing::info!(job = %name, "job cancelled");
            }
            RunOutcome::Failed(e) => {
                let msg = e.to_string();
                log_store(
                    "status",
                    db.set_status(name, DownloadStatus::Failed, Some(&msg)).await,
                );
                self.inner.publisher.update(|s| {
                    s.error_message = Some(msg.clone());
                    s.set_status(Some(DownloadStatus::Failed));
                });
                tracing::error!(job = %name, "job failed: {}", msg);
            }
        }
    }

    /// Cancelled: clear stored progress and the completion flag, delete part files
    /// (and the merged archive, if any), publish CANCELLED.
    async fn discard_progress(&self, archive: Option<std::path::PathBuf>) {
        let db = &self.inner.db;
        let name = self.name().to_string();
        log_store("clear", db.clear_state(&name).await);
        log_store("completion", db.set_completion_shown(&name, false).await);
        log_store(
            "status",
            db.set_status(&name, DownloadStatus::Cancelled, None).await,
        );

        let dir = self.inner.spec.download_dir.clone();
        let n = self.inner.settings.chunk_count;
        let job = name.clone();
        let removed = tokio::task::spawn_blocking(move || -> Result<()> {
            remove_parts(&dir, &job, n)?;
            if let Some(archive) = archive {
                match std::fs::remove_file(&archive) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(())
        })
        .await;
        match removed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(job = %name, "cleanup after cancel failed: {:#}", e),
            Err(e) => tracing::warn!(job = %name, "cleanup task failed: {}", e),
        }

        self.inner.publisher.update(|s| {
            s.set_bytes(0, 0);
            s.progress = Progress::Percent(0);
            s.error_message = None;
            s.completion_notice_pending = false;
            s.set_status(Some(DownloadStatus::Cancelled));
        });
    }

    /// Ask the live run to pause. Only honoured while DOWNLOADING; returns whether the
    /// request was accepted. The status turns PAUSED once the run has wound down.
    pub async fn request_pause(&self) -> Result<bool> {
        let live = self.inner.live.lock().await;
        let Some(run) = live.as_ref().filter(|r| !r.is_finished()) else {
            return Ok(false);
        };
        if !self.snapshot().is_downloading() {
            return Ok(false);
        }
        run.signals.request_pause();
        self.inner.db.set_should_pause(self.name(), true).await?;
        self.inner.publisher.message("Pausing");
        tracing::info!(job = %self.name(), "pause requested");
        Ok(true)
    }

    /// Cancel from any state. Idempotent.
    ///
    /// A live run is signalled and cleans up its part files as it exits; otherwise
    /// the part files are removed here, under the job's lock. Fails if a run in
    /// another process holds the lock.
    pub async fn cancel(&self) -> Result<()> {
        let live = self.inner.live.lock().await;
        let running = live
            .as_ref()
            .filter(|r| !r.is_finished())
            .map(|r| Arc::clone(&r.signals));
        tracing::info!(job = %self.name(), live = running.is_some(), "cancel requested");
        match running {
            Some(signals) => {
                signals.request_stop();
                let db = &self.inner.db;
                let name = self.name();
                db.clear_state(name).await?;
                db.set_completion_shown(name, false).await?;
                db.set_status(name, DownloadStatus::Cancelled, None).await?;
                self.inner.publisher.message("Cancelling");
            }
            None => {
                let guard = self.acquire_lock()?;
                let archive = self
                    .snapshot()
                    .output_file_name
                    .map(|f| self.inner.spec.download_dir.join(f));
                self.discard_progress(archive).await;
                drop(guard);
            }
        }
        Ok(())
    }

    /// Close the progress view. Dismissing a COMPLETED job acknowledges its completion.
    pub async fn dismiss(&self) -> Result<()> {
        if self.snapshot().status == Some(DownloadStatus::Completed) {
            self.inner.db.set_completion_shown(self.name(), true).await?;
            self.inner.publisher.update(|s| {
                s.completion_notice_pending = false;
                s.dismissed = true;
            });
        } else {
            self.inner.publisher.update(|s| s.dismissed = true);
        }
        Ok(())
    }

    /// Close the progress view while the run keeps going.
    pub fn dismiss_and_continue_in_background(&self) {
        self.inner.publisher.update(|s| s.dismissed = true);
    }

    /// True while a run task exists and has not finished.
    pub async fn is_running(&self) -> bool {
        let live = self.inner.live.lock().await;
        live.as_ref().is_some_and(|r| !r.is_finished())
    }

    /// Wait for the live run (if any) to finish and return the final snapshot.
    pub async fn wait(&self) -> DownloadSnapshot {
        let done = {
            let live = self.inner.live.lock().await;
            live.as_ref().map(|r| r.done.clone())
        };
        if let Some(mut done) = done {
            let _ = done.wait_for(|finished| *finished).await;
        }
        self.snapshot()
    }
}
