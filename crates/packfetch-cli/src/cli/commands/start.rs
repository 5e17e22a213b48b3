//! `packfetch start <url> <file-name>` – run the job in the foreground until it settles.

use anyhow::{bail, Result};
use packfetch_core::config::PackfetchConfig;
use packfetch_core::{DownloadStatus, StateDb};

use super::{open_controller, socket_path};
use crate::cli::control_socket;

pub async fn run_start(
    cfg: &PackfetchConfig,
    db: StateDb,
    job: &str,
    url: &str,
    file_name: &str,
) -> Result<()> {
    let controller = open_controller(cfg, db, job).await?;
    // Start first: a refused start must not take over the live run's socket.
    controller.start(url, file_name).await?;

    let _listener = socket_path(job).and_then(|path| {
        match control_socket::spawn_control_listener(controller.clone(), &path) {
            Ok(l) => {
                tracing::debug!(path = %path.display(), "control socket listening");
                Some(l)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "control socket bind: {:#}", e);
                None
            }
        }
    });

    let mut rx = controller.subscribe();
    let printer = tokio::spawn(async move {
        let mut last = String::new();
        while rx.changed().await.is_ok() {
            let message = rx.borrow_and_update().message.clone();
            if message != last {
                println!("  {}", message);
                last = message;
            }
        }
    });

    tokio::select! {
        _ = controller.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted, pausing (run `packfetch start` again to resume)");
            controller.request_pause().await?;
        }
    }
    let snap = controller.wait().await;
    printer.abort();

    match snap.status {
        Some(DownloadStatus::Completed) => {
            println!("{}", snap.message);
            println!("Installed into {}", controller.spec().extract_dir.display());
        }
        Some(DownloadStatus::Failed) => {
            bail!(snap
                .error_message
                .unwrap_or_else(|| "download failed".to_string()))
        }
        _ => println!("{}", snap.message),
    }
    Ok(())
}
