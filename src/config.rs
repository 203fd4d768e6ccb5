//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$CHATSWEEP_CONFIG` (environment variable)
//! 2. `~/.config/chatsweep/config.toml` (Linux/macOS)
//!    `%APPDATA%\chatsweep\config.toml` (Windows)
//! 3. Built-in defaults

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Remote action bridge settings.
    pub bridge: BridgeConfig,
    /// Bulk task tuning.
    pub task: TaskConfig,
    /// Message filtering data.
    pub filters: FilterConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs and derived data.
    pub cache_dir: Option<PathBuf>,
}

/// Remote action bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Messages fetched per bridge page.
    pub page_size: usize,
    /// Seconds to wait for the bridge to become available before a
    /// connection error is surfaced. Consumed by bridge implementations;
    /// the bulk engine itself imposes no per-call timeout.
    pub connect_timeout_secs: u64,
}

/// Bulk task tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Messages fetched per scan page during a bulk run.
    pub page_size: usize,
    /// Optional `[min, max]` milliseconds slept between consecutive
    /// remote actions. A random point in the interval is chosen per
    /// action. `None` disables pacing.
    pub action_delay_ms: Option<[u64; 2]>,
}

/// Message filtering data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Sender ids of well-known system accounts (assistant bots, team
    /// broadcast accounts). Sweeps exclude messages from these senders
    /// when the `not_system_sender` constraint is applied.
    pub system_sender_ids: HashSet<Uuid>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            action_delay_ms: None,
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    // 1. Environment variable override
    if let Ok(env_path) = std::env::var("CHATSWEEP_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    // 2. Standard config directory
    dirs::config_dir().map(|d| d.join("chatsweep").join("config.toml"))
}

/// Return the cache directory for logs and derived data.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chatsweep")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("chatsweep.log")
}
