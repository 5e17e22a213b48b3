use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::transfer::TransferOptions;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per chunk (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

/// Global configuration loaded from `~/.config/packfetch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackfetchConfig {
    /// Number of parallel chunks a download is split into.
    pub chunk_count: usize,
    /// Minimum wall-clock interval between bytes-read checkpoints, in milliseconds.
    pub checkpoint_interval_ms: u64,
    /// Connect timeout for every request, in seconds.
    pub connect_timeout_secs: u64,
    /// Abort a chunk transfer whose throughput stays below 1 KiB/s for this long.
    pub low_speed_time_secs: u64,
    /// Optional receive buffer size in bytes (None = library default).
    #[serde(default)]
    pub buffer_size: Option<usize>,
    /// Directory for part files and the merged archive (None = XDG data dir).
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Root the archive is installed into (None = XDG data dir `installed/`).
    #[serde(default)]
    pub extract_dir: Option<PathBuf>,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for PackfetchConfig {
    fn default() -> Self {
        Self {
            chunk_count: 4,
            checkpoint_interval_ms: 2000,
            connect_timeout_secs: 30,
            low_speed_time_secs: 60,
            buffer_size: None,
            download_dir: None,
            extract_dir: None,
            retry: None,
        }
    }
}

impl PackfetchConfig {
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(|r| RetryPolicy {
                max_attempts: r.max_attempts.max(1),
                base_delay: Duration::from_secs_f64(r.base_delay_secs.max(0.0)),
                max_delay: Duration::from_secs(r.max_delay_secs),
            })
            .unwrap_or_default()
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            low_speed_time: Duration::from_secs(self.low_speed_time_secs),
            buffer_size: self.buffer_size,
        }
    }

    /// Download directory, falling back to `~/.local/share/packfetch/downloads`.
    pub fn resolved_download_dir(&self) -> Result<PathBuf> {
        match &self.download_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(xdg::BaseDirectories::with_prefix("packfetch")?
                .get_data_home()
                .join("downloads")),
        }
    }

    /// Extraction root, falling back to `~/.local/share/packfetch/installed`.
    pub fn resolved_extract_dir(&self) -> Result<PathBuf> {
        match &self.extract_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(xdg::BaseDirectories::with_prefix("packfetch")?
                .get_data_home()
                .join("installed")),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("packfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Control socket of a foreground `packfetch start` for `job`, in the same XDG state
/// dir as the DB. One socket per job so foreground runs of different jobs coexist.
pub fn control_socket_path(job: &str) -> Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("packfetch")?.get_state_home();
    Ok(dir.join(format!("control-{}.sock", job)))
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PackfetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = PackfetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: PackfetchConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = PackfetchConfig::default();
        assert_eq!(cfg.chunk_count, 4);
        assert_eq!(cfg.checkpoint_interval(), Duration::from_secs(2));
        assert!(cfg.download_dir.is_none());
        assert!(cfg.retry.is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = PackfetchConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: PackfetchConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.chunk_count, cfg.chunk_count);
        assert_eq!(parsed.checkpoint_interval_ms, cfg.checkpoint_interval_ms);
        assert_eq!(parsed.connect_timeout_secs, cfg.connect_timeout_secs);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            chunk_count = 8
            checkpoint_interval_ms = 500
            connect_timeout_secs = 10
            low_speed_time_secs = 20
            download_dir = "/tmp/packs"
            extract_dir = "/tmp/installed"
        "#;
        let cfg: PackfetchConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.chunk_count, 8);
        assert_eq!(cfg.checkpoint_interval(), Duration::from_millis(500));
        assert_eq!(cfg.resolved_download_dir().unwrap(), PathBuf::from("/tmp/packs"));
        assert_eq!(cfg.resolved_extract_dir().unwrap(), PathBuf::from("/tmp/installed"));
        assert!(cfg.buffer_size.is_none());
    }

    #[test]
    fn config_toml_retry_section() {
        let toml = r#"
            chunk_count = 4
            checkpoint_interval_ms = 2000
            connect_timeout_secs = 30
            low_speed_time_secs = 60
            buffer_size = 65536

            [retry]
            max_attempts = 3
            base_delay_secs = 0.5
            max_delay_secs = 15
        "#;
        let cfg: PackfetchConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.buffer_size, Some(65536));
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(15));
    }

    #[test]
    fn missing_retry_section_uses_default_policy() {
        let policy = PackfetchConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, RetryPolicy::default().max_attempts);
    }
}
