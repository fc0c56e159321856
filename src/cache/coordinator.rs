//! Bringing environments to a ready state
//!
//! `ensure_ready` is the only entry point that mutates environments. Readers
//! of a ready environment take no lock; every mutation (create, install,
//! rebuild, delete) happens while holding the environment's lock marker, and
//! the environment is re-validated after the lock is taken since another
//! process may have finished the work while we waited.
//!
//! ```text
//! validate ──Ready──────────────────────────────► Reused
//!    │
//!    └─other─► lock ─► validate ─Ready──────────► Reused
//!                         │──NeedsInstall─► pip ─► Reinstalled
//!                         └──Invalid──► rm, venv, pip ─► Built
//! ```

use crate::builder::EnvBuilder;
use crate::cache::fingerprint::{dependency_hash, read_dependency_file, Fingerprint};
use crate::cache::lock::LockManager;
use crate::cache::store::{EnvRecord, EnvironmentStore, Validity};
use crate::error::{InvenvError, InvenvResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

/// Where an environment lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvLocation {
    /// Under the cache root, named by fingerprint
    Fingerprinted,
    /// A directory chosen by the caller (e.g. `./.venv`)
    Directory(PathBuf),
}

/// Inputs that determine an environment
#[derive(Debug, Clone)]
pub struct EnvRequest {
    /// Resolved interpreter path
    pub interpreter: PathBuf,
    /// `--version` output of the interpreter
    pub interpreter_version: String,
    /// Requirements file to install, if any
    pub dependency_file: Option<PathBuf>,
    pub location: EnvLocation,
}

/// How `ensure_ready` got the environment to a ready state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Existing environment used as is
    Reused,
    /// Created from scratch
    Built,
    /// Requirements installed into an existing environment
    Reinstalled,
}

/// A ready-to-use environment
#[derive(Debug, Clone)]
pub struct ReadyEnv {
    pub dir: PathBuf,
    pub fingerprint: Fingerprint,
    pub outcome: Outcome,
}

/// Result of a garbage collection pass
#[derive(Debug, Clone, Default)]
pub struct GcReport {
    /// Removed directories (would-be removed on a dry run)
    pub removed: Vec<PathBuf>,
    /// Entries recently used
    pub kept: usize,
    /// Entries skipped because a lock marker exists
    pub locked: usize,
    /// Entries skipped because a live process references them
    pub in_use: usize,
    /// Entries that could not be removed
    pub failed: usize,
}

/// Coordinates store, locks and builder
#[derive(Clone)]
pub struct CacheCoordinator {
    store: EnvironmentStore,
    locks: LockManager,
    builder: Arc<dyn EnvBuilder>,
}

impl CacheCoordinator {
    pub fn new(store: EnvironmentStore, locks: LockManager, builder: Arc<dyn EnvBuilder>) -> Self {
        Self {
            store,
            locks,
            builder,
        }
    }

    pub fn store(&self) -> &EnvironmentStore {
        &self.store
    }

    /// Return a ready environment for `request`, building or updating it if
    /// needed. `force_rebuild` deletes and rebuilds the environment.
    pub async fn ensure_ready(
        &self,
        request: &EnvRequest,
        force_rebuild: bool,
    ) -> InvenvResult<ReadyEnv> {
        let content = read_dependency_file(request.dependency_file.as_deref()).await?;
        let hash = dependency_hash(content.as_deref());
        let fingerprint = Fingerprint::compute(content.as_deref(), &request.interpreter_version);
        let dir = match &request.location {
            EnvLocation::Fingerprinted => self.store.locate(&fingerprint),
            EnvLocation::Directory(dir) => dir.components().collect(),
        };
        debug!("Environment for {} is {}", fingerprint, dir.display());

        if !force_rebuild {
            let record = self.store.read_record(&dir).await;
            let validity =
                EnvironmentStore::validate(record.as_ref(), &request.interpreter_version, &hash);
            if validity == Validity::Ready {
                debug!("Reusing {}", dir.display());
                self.store.mark_used(&dir);
                return Ok(ReadyEnv {
                    dir,
                    fingerprint,
                    outcome: Outcome::Reused,
                });
            }
        }

        if matches!(request.location, EnvLocation::Directory(_))
            && !self.store.is_replaceable(&dir).await
        {
            return Err(InvenvError::User(format!(
                "{} exists and is not a virtual environment, refusing to replace it",
                dir.display()
            )));
        }

        let lock = self.locks.acquire(&dir).await?;
        let result = self.update_locked(request, &dir, &hash, force_rebuild).await;

        let result = match result {
            Ok(outcome) => {
                self.store.mark_used(&dir);
                Ok(outcome)
            }
            Err(e) => {
                warn!("Removing {} after failure", dir.display());
                if let Err(cleanup) = self.store.remove(&dir).await {
                    warn!("Cleanup of {} failed: {}", dir.display(), cleanup);
                }
                Err(e)
            }
        };

        if let Err(e) = lock.release() {
            if result.is_ok() {
                return Err(e);
            }
            warn!("{}", e);
        }
        let outcome = result?;

        Ok(ReadyEnv {
            dir,
            fingerprint,
            outcome,
        })
    }

    /// Bring `dir` up to date. Caller holds its lock.
    async fn update_locked(
        &self,
        request: &EnvRequest,
        dir: &Path,
        hash: &str,
        force_rebuild: bool,
    ) -> InvenvResult<Outcome> {
        if force_rebuild {
            info!("Rebuilding {}", dir.display());
            self.store.remove(dir).await?;
        }

        let record = self.store.read_record(dir).await;
        match EnvironmentStore::validate(record.as_ref(), &request.interpreter_version, hash) {
            Validity::Ready => {
                debug!("{} was completed by another process", dir.display());
                Ok(Outcome::Reused)
            }
            Validity::NeedsInstall => {
                let mut record = record.ok_or_else(|| {
                    InvenvError::Internal("pending install without a record".to_string())
                })?;
                self.install(request, dir, &mut record, hash).await?;
                Ok(Outcome::Reinstalled)
            }
            Validity::Invalid(reason) => {
                debug!("Building {}: {}", dir.display(), reason);
                self.store.remove(dir).await?;
                if let Some(parent) = dir.parent() {
                    fs::create_dir_all(parent)
                        .await
                        .map_err(|e| InvenvError::io(format!("creating {}", parent.display()), e))?;
                }

                self.builder.create(dir, &request.interpreter).await?;
                let mut record = EnvRecord::new(&request.interpreter, &request.interpreter_version);
                self.store.write_record(dir, &record).await?;

                self.install(request, dir, &mut record, hash).await?;
                Ok(Outcome::Built)
            }
        }
    }

    async fn install(
        &self,
        request: &EnvRequest,
        dir: &Path,
        record: &mut EnvRecord,
        hash: &str,
    ) -> InvenvResult<()> {
        if let Some(file) = &request.dependency_file {
            self.builder.install(dir, file).await?;
        }
        record.set_dependency_hash(hash);
        self.store.write_record(dir, record).await
    }

    /// Delete environments not used for `max_age`.
    ///
    /// Locked environments and environments a live process refers to are
    /// skipped. Per-entry failures are logged and counted, not returned.
    pub async fn collect_garbage(&self, max_age: Duration, dry_run: bool) -> InvenvResult<GcReport> {
        let mut report = GcReport::default();

        for mut entry in self.store.list().await? {
            if !entry.is_unused_for(max_age) {
                report.kept += 1;
                continue;
            }
            if entry.locked {
                debug!("Skipping locked {}", entry.path.display());
                report.locked += 1;
                continue;
            }
            if self.locks.is_in_use(&entry.path) {
                debug!("Skipping in-use {}", entry.path.display());
                report.in_use += 1;
                continue;
            }
            if dry_run {
                report.removed.push(entry.path);
                continue;
            }

            // Hold the lock so no build starts while the tree is deleted
            let lock = match self.locks.try_acquire(&entry.path) {
                Ok(Some(lock)) => lock,
                Ok(None) => {
                    report.locked += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Cannot lock {}: {}", entry.path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };

            // A reader may have picked the environment up before we locked it
            entry.last_used = self.store.last_used(&entry.path).await;
            if !entry.is_unused_for(max_age) || self.locks.is_in_use(&entry.path) {
                debug!("{} was used meanwhile, keeping it", entry.path.display());
                report.kept += 1;
                if let Err(e) = lock.release() {
                    warn!("{}", e);
                }
                continue;
            }

            match self.store.remove(&entry.path).await {
                Ok(()) => {
                    info!("Removed unused environment {}", entry.path.display());
                    report.removed.push(entry.path);
                }
                Err(e) => {
                    warn!("{}", e);
                    report.failed += 1;
                }
            }
            if let Err(e) = lock.release() {
                warn!("{}", e);
            }
        }

        Ok(report)
    }

    /// Delete every environment that is neither locked nor in use
    pub async fn clear(&self) -> InvenvResult<GcReport> {
        self.collect_garbage(Duration::ZERO, false).await
    }
}
