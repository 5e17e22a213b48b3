//! `packfetch dismiss` – acknowledge a finished job.

use anyhow::Result;
use packfetch_core::config::PackfetchConfig;
use packfetch_core::StateDb;

use super::open_controller;

pub async fn run_dismiss(cfg: &PackfetchConfig, db: StateDb, job: &str) -> Result<()> {
    let controller = open_controller(cfg, db, job).await?;
    let pending = controller.completion_notice_pending();
    controller.dismiss().await?;
    if pending {
        println!("Completion of job {job} acknowledged");
    } else {
        println!("Nothing to acknowledge for job {job}");
    }
    Ok(())
}
