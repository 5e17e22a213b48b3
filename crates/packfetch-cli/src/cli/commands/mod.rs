//! CLI command handlers, one file per command.

mod cancel;
mod dismiss;
mod pause;
mod start;
mod status;

pub use cancel::run_cancel;
pub use dismiss::run_dismiss;
pub use pause::run_pause;
pub use start::run_start;
pub use status::run_status;

use anyhow::Result;
use packfetch_core::config::{self, PackfetchConfig};
use packfetch_core::{JobController, JobRegistry, JobSettings, JobSpec, StateDb};
use std::path::PathBuf;
use std::sync::Arc;

use super::control_socket::{self, ControlVerb};

/// Controller for `job` with its state restored from the store.
async fn open_controller(cfg: &PackfetchConfig, db: StateDb, job: &str) -> Result<JobController> {
    let spec = JobSpec::from_config(job, cfg)?;
    let settings = JobSettings::from_config(cfg);
    JobController::new(spec, settings, db, Arc::new(JobRegistry::new())).await
}

fn socket_path(job: &str) -> Option<PathBuf> {
    match config::control_socket_path(job) {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::debug!("no control socket path: {:#}", e);
            None
        }
    }
}

/// Forward a command to a foreground `start`, if one is listening.
async fn notify_running(verb: ControlVerb, job: &str) -> bool {
    let Some(path) = socket_path(job) else {
        return false;
    };
    match control_socket::send_command(&path, verb, job).await {
        Ok(sent) => sent,
        Err(e) => {
            tracing::warn!(path = %path.display(), "control socket send: {:#}", e);
            false
        }
    }
}
