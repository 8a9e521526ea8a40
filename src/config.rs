//! Player configuration: JSON file plus command line overrides.

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::client::Timeouts;

pub const CONFIG_FILE: &str = "segplay.json";
pub const CONFIG_ENV: &str = "SEGPLAY_CONFIG";

/// Catalog call timeouts, seconds
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub quick: u64,
    pub normal: u64,
    pub slow: u64,
    pub delete: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        let t = Timeouts::default();
        Self {
            quick: t.quick.as_secs(),
            normal: t.normal.as_secs(),
            slow: t.slow.as_secs(),
            delete: t.delete.as_secs(),
        }
    }
}

impl From<TimeoutConfig> for Timeouts {
    fn from(c: TimeoutConfig) -> Self {
        Timeouts {
            quick: Duration::from_secs(c.quick),
            normal: Duration::from_secs(c.normal),
            slow: Duration::from_secs(c.slow),
            delete: Duration::from_secs(c.delete),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Root of the segment storage (`srvN/day/camNN/<hex>.ts` below it)
    pub data_path: PathBuf,
    /// Catalog service base URI
    pub master_uri: String,
    /// Player id; derived from a `playerNN` hostname when unset
    pub player_id: Option<String>,
    /// Recording day `YYYY-MM-DD`; today when unset
    pub day: Option<String>,
    pub api_enabled: bool,
    pub api_port: u16,
    pub timeouts: TimeoutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("/data"),
            master_uri: "http://master:8080".to_string(),
            player_id: None,
            day: None,
            api_enabled: true,
            api_port: 9090,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).with_context(|| format!("Failed to write config: {}", path.display()))
    }

    /// Configured day or today's local date
    pub fn day_or_today(&self) -> String {
        self.day.clone().unwrap_or_else(today)
    }

    /// Configured player id or the one derived from the hostname
    pub fn player_id_or_host(&self) -> Option<String> {
        self.player_id.clone().or_else(|| {
            let host = std::fs::read_to_string("/etc/hostname").ok()?;
            player_id_from_hostname(&host)
        })
    }
}

/// Today's local date as `YYYY-MM-DD`
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// `player12` -> `12`
pub fn player_id_from_hostname(host: &str) -> Option<String> {
    let id = host.trim().strip_prefix("player")?;
    (!id.is_empty()).then(|| id.to_string())
}

/// Resolve the config file path.
///
/// Priority: CLI `--config` → `SEGPLAY_CONFIG` env var → platform config dir
/// (`~/.config/segplay/segplay.json` on Linux) → `./segplay.json`.
pub fn config_path(cli: Option<PathBuf>) -> PathBuf {
    cli.or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .or_else(|| dirs_next::config_dir().map(|d| d.join("segplay").join(CONFIG_FILE)))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

/// Default log file location
pub fn log_path() -> PathBuf {
    dirs_next::data_dir()
        .map(|d| d.join("segplay"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("segplay.log")
}
