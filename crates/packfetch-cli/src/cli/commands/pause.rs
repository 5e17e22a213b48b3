//! `packfetch pause` – pause the job. A foreground `start` is signalled over the control
//! socket; otherwise the pause is recorded in the store.

use anyhow::Result;
use packfetch_core::config::PackfetchConfig;
use packfetch_core::job::lock;
use packfetch_core::{DownloadStatus, StateDb};

use super::notify_running;
use crate::cli::control_socket::ControlVerb;

pub async fn run_pause(cfg: &PackfetchConfig, db: &StateDb, job: &str) -> Result<()> {
    if notify_running(ControlVerb::Pause, job).await {
        println!("Pause requested for job {job}");
        return Ok(());
    }
    if db.get_status(job).await? != Some(DownloadStatus::Downloading) {
        println!("Job {job} is not downloading; nothing to pause");
        return Ok(());
    }
    db.set_should_pause(job, true).await?;
    if lock::is_locked(&cfg.resolved_download_dir()?, job) {
        // A run without a control socket; it polls the stored flag.
        println!("Pause requested for job {job}");
        return Ok(());
    }
    // Nobody holds the job: the stored DOWNLOADING is left over from a dead process.
    db.set_status(job, DownloadStatus::Paused, None).await?;
    println!("Paused job {job}");
    Ok(())
}
