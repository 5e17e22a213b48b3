//! CLI for the packfetch downloader and installer.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use packfetch_core::config;
use packfetch_core::StateDb;

use commands::{run_cancel, run_dismiss, run_pause, run_start, run_status};

/// Job name used when `--job` is not given.
pub const DEFAULT_JOB: &str = "pack";

/// Top-level CLI for packfetch.
#[derive(Debug, Parser)]
#[command(name = "packfetch")]
#[command(about = "packfetch: resumable parallel download and install of one archive", long_about = None)]
pub struct Cli {
    /// Job name; keys the stored progress and names the part files.
    #[arg(long, global = true, default_value = DEFAULT_JOB, value_parser = parse_job_name)]
    pub job: String,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download, merge and install an archive in the foreground (resumes a paused job).
    Start {
        /// Direct HTTP/HTTPS URL of the archive.
        url: String,
        /// File name of the merged archive inside the download directory.
        file_name: String,
    },

    /// Pause the job. A foreground `start` is signalled over the control socket.
    Pause,

    /// Cancel the job and delete its partial data.
    Cancel,

    /// Show the job's status.
    Status {
        /// Print the snapshot as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Acknowledge a finished job (clears the completion notice).
    Dismiss,
}

/// Job names become file name prefixes, so path separators and dot names are refused.
fn parse_job_name(s: &str) -> Result<String, String> {
    let ok = !s.is_empty()
        && s != "."
        && s != ".."
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(s.to_string())
    } else {
        Err(format!(
            "invalid job name {:?} (use letters, digits, '-', '_' or '.')",
            s
        ))
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let db = StateDb::open_default().await?;
        let job = cli.job.as_str();

        match cli.command {
            CliCommand::Start { url, file_name } => {
                run_start(&cfg, db, job, &url, &file_name).await?
            }
            CliCommand::Pause => run_pause(&cfg, &db, job).await?,
            CliCommand::Cancel => run_cancel(&cfg, db, job).await?,
            CliCommand::Status { json } => run_status(&db, job, json).await?,
            CliCommand::Dismiss => run_dismiss(&cfg, db, job).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
