//! `packfetch cancel` – cancel the job and discard its partial data.

use anyhow::Result;
use packfetch_core::config::PackfetchConfig;
use packfetch_core::StateDb;

use super::{notify_running, open_controller};
use crate::cli::control_socket::ControlVerb;

pub async fn run_cancel(cfg: &PackfetchConfig, db: StateDb, job: &str) -> Result<()> {
    if notify_running(ControlVerb::Cancel, job).await {
        println!("Cancel requested for job {job}");
        return Ok(());
    }
    let controller = open_controller(cfg, db, job).await?;
    controller.cancel().await?;
    println!("Cancelled job {job}");
    Ok(())
}
