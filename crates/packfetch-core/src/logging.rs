//! Logging: `tracing` to a file in the XDG state dir, with stderr as the fallback.
//!
//! `RUST_LOG` overrides the default filter in both modes.

use anyhow::{anyhow, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,packfetch=debug,packfetch_core=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// `~/.local/state/packfetch/packfetch.log` on Debian.
pub fn log_file_path() -> Result<PathBuf> {
    let state_home = xdg::BaseDirectories::with_prefix("packfetch")?.get_state_home();
    Ok(state_home.join("packfetch.log"))
}

/// Install the global subscriber writing to [`log_file_path`] (appending).
///
/// Errors if the log file cannot be opened or a subscriber is already set; the CLI
/// then calls [`init_logging_stderr`].
pub fn init_logging() -> Result<()> {
    let path = log_file_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("{}", e))?;

    tracing::info!("packfetch logging initialized at {}", path.display());
    Ok(())
}

/// Stderr-only logging. A second call is a no-op.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
