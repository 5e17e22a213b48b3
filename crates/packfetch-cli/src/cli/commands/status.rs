//! `packfetch status` – show the job's stored state.
//!
//! Reads the store directly: a DOWNLOADING job may be running in a foreground
//! `start` elsewhere, so no interrupted-run recovery is applied here.

use anyhow::Result;
use packfetch_core::{DownloadSnapshot, Progress, StateDb};

fn format_status(snap: &DownloadSnapshot) -> String {
    let state = snap.status.map(|s| s.as_str()).unwrap_or("idle");
    let progress = match snap.progress {
        Progress::Percent(p) => format!("{p}%"),
        Progress::Indeterminate => "-".to_string(),
    };
    let mut out = format!(
        "{:<12} {:<12} {:<6} {}/{} bytes  {}",
        snap.job, state, progress, snap.bytes_read, snap.total_bytes, snap.message
    );
    if let Some(err) = &snap.error_message {
        out.push_str(&format!("\n  error: {err}"));
    }
    if snap.completion_notice_pending {
        out.push_str("\n  (run `packfetch dismiss` to acknowledge)");
    }
    out
}

pub async fn run_status(db: &StateDb, job: &str, json: bool) -> Result<()> {
    let rec = db.load(job).await?;
    let snap = DownloadSnapshot::from_record(job, &rec);
    if json {
        println!("{}", serde_json::to_string_pretty(&snap)?);
    } else {
        println!("{:<12} {:<12} {:<6} {}", "JOB", "STATE", "DONE", "DETAIL");
        println!("{}", format_status(&snap));
    }
    Ok(())
}
