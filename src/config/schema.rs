//! Configuration schema for invenv
//!
//! Configuration is stored at `~/.config/invenv/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Environment cache settings
    pub cache: CacheConfig,

    /// Lock acquisition settings
    pub lock: LockConfig,

    /// Environment builder settings
    pub builder: BuilderConfig,
}

/// General application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Hide progress output
    pub silent: bool,

    /// Stream venv/pip output live instead of capturing it
    pub stream_output: bool,
}

/// Environment cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root (defaults to ~/.local/invenv)
    pub root: Option<PathBuf>,

    /// Remove environments unused for N days (0 = disabled)
    pub gc_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            gc_days: 14,
        }
    }
}

impl CacheConfig {
    /// Staleness threshold for unused environments, `None` when disabled
    pub fn gc_max_age(&self) -> Option<Duration> {
        (self.gc_days > 0).then(|| Duration::from_secs(u64::from(self.gc_days) * 24 * 60 * 60))
    }
}

/// Lock acquisition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Age after which a lock marker is considered abandoned
    pub stale_after_secs: u64,

    /// Delay between acquisition attempts
    pub poll_interval_ms: u64,

    /// Maximum number of acquisition attempts
    pub max_attempts: u32,

    /// Treat locks as stale when no running process references the environment
    pub liveness_probe: bool,

    /// Minimum lock age before the liveness probe is consulted
    pub liveness_grace_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 15 * 60,
            poll_interval_ms: 1000,
            max_attempts: 300,
            liveness_probe: true,
            liveness_grace_secs: 5,
        }
    }
}

/// Tool used to create new environments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Creator {
    /// Built-in `venv` module, falling back to `virtualenv`
    #[default]
    Auto,
    /// Always `python -m venv`
    Venv,
    /// Always `virtualenv`
    Virtualenv,
}

/// Environment builder configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Environment creation tool
    pub creator: Creator,
}
