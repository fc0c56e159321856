//! Effective runtime settings
//!
//! Configuration file values merged with command line flags, resolved once at
//! startup and handed to the components that need them.

use crate::builder::{CommandRunner, OutputMode, VenvBuilder};
use crate::cache::{
    default_probe, CacheCoordinator, EnvironmentStore, LockManager, LockSettings, NoProbe,
};
use crate::config::{Config, ConfigManager, Creator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Command line values that take precedence over the configuration file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub cache_dir: Option<PathBuf>,
    pub silent: bool,
    pub verbosity: u8,
}

/// Resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache_root: PathBuf,
    pub lock: LockSettings,
    pub liveness_probe: bool,
    pub creator: Creator,
    pub output: OutputMode,
    /// Age after which unused environments are collected, `None` when disabled
    pub gc_max_age: Option<Duration>,
    pub silent: bool,
    pub verbosity: u8,
}

impl Settings {
    pub fn resolve(config: &Config, overrides: &Overrides) -> Self {
        // -vv shows what pip is doing
        let output = if config.general.stream_output || overrides.verbosity >= 2 {
            OutputMode::Stream
        } else {
            OutputMode::Capture
        };

        Self {
            cache_root: ConfigManager::cache_root(config, overrides.cache_dir.as_deref()),
            lock: LockSettings::from(&config.lock),
            liveness_probe: config.lock.liveness_probe,
            creator: config.builder.creator,
            output,
            gc_max_age: config.cache.gc_max_age(),
            silent: overrides.silent || config.general.silent,
            verbosity: overrides.verbosity,
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn lock_manager(&self) -> LockManager {
        let probe = if self.liveness_probe {
            default_probe()
        } else {
            Arc::new(NoProbe)
        };
        LockManager::new(self.lock.clone(), probe)
    }

    /// Coordinator over the cache root, building with real tools
    pub fn coordinator(&self) -> CacheCoordinator {
        let builder = VenvBuilder::new(CommandRunner::new(self.output), self.creator);
        CacheCoordinator::new(
            EnvironmentStore::new(&self.cache_root),
            self.lock_manager(),
            Arc::new(builder),
        )
    }
}
