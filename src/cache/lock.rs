//! Cross-process environment locks
//!
//! A lock is a zero-byte marker file next to the environment directory
//! (`<dir>.lock`), created with `create_new` so that exactly one process wins
//! a race. Waiters poll, and reclaim the marker when its holder looks dead:
//!
//! | Signal | Condition | Effect |
//! |--------|-----------|--------|
//! | Age | marker older than `stale_after` | marker removed, retry |
//! | Liveness | no process references the env dir (after `liveness_grace`) | marker removed, retry |
//!
//! Waiting is bounded: by `max_attempts` when liveness can be probed, by the
//! `stale_after` time budget otherwise.

use crate::cache::liveness::ProcessProbe;
use crate::config::schema::LockConfig;
use crate::error::{InvenvError, InvenvResult};
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// Lock timing parameters
#[derive(Debug, Clone)]
pub struct LockSettings {
    /// Age after which a marker is presumed abandoned
    pub stale_after: Duration,
    /// Delay between attempts
    pub poll_interval: Duration,
    /// Attempt ceiling when liveness can be probed
    pub max_attempts: u32,
    /// Minimum marker age before the liveness probe is trusted
    pub liveness_grace: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self::from(&LockConfig::default())
    }
}

impl From<&LockConfig> for LockSettings {
    fn from(config: &LockConfig) -> Self {
        Self {
            stale_after: Duration::from_secs(config.stale_after_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_attempts: config.max_attempts.max(1),
            liveness_grace: Duration::from_secs(config.liveness_grace_secs),
        }
    }
}

/// Why a marker was judged stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// Older than the stale threshold
    Expired(Duration),
    /// No running process references the environment
    Abandoned,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired(age) => write!(f, "expired, {}s old", age.as_secs()),
            Self::Abandoned => write!(f, "no live process"),
        }
    }
}

/// State of a lock marker as seen by a waiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerState {
    /// Removed since the last attempt
    Gone,
    /// Held by a presumably live process
    Held,
    /// Presumed abandoned; `observed` is the mtime it was judged on
    Stale {
        reason: StaleReason,
        observed: SystemTime,
    },
}

/// Path of the lock marker for an environment directory
pub fn lock_path(env_dir: &Path) -> PathBuf {
    let mut name = env_dir
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("env"));
    name.push(".lock");
    env_dir.with_file_name(name)
}

/// Exclusive right to mutate an environment directory.
///
/// Released explicitly with [`EnvLock::release`]; dropping an unreleased lock
/// removes the marker as well.
#[derive(Debug)]
pub struct EnvLock {
    path: PathBuf,
    released: bool,
}

impl EnvLock {
    /// Path of the held marker
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the marker
    pub fn release(mut self) -> InvenvResult<()> {
        self.released = true;
        debug!("Releasing lock {}", self.path.display());
        remove_marker(&self.path)
            .map_err(|e| InvenvError::io(format!("removing lock {}", self.path.display()), e))
    }
}

impl Drop for EnvLock {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = remove_marker(&self.path) {
                warn!("Failed to remove lock {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Acquires and releases environment locks
#[derive(Clone)]
pub struct LockManager {
    settings: LockSettings,
    probe: Arc<dyn ProcessProbe>,
}

impl LockManager {
    /// Create a lock manager using `probe` for liveness checks
    pub fn new(settings: LockSettings, probe: Arc<dyn ProcessProbe>) -> Self {
        Self { settings, probe }
    }

    /// Whether a marker currently exists for `env_dir`
    pub fn is_locked(env_dir: &Path) -> bool {
        lock_path(env_dir).exists()
    }

    /// Remove the marker of `env_dir`. Removing an absent marker is not an error.
    pub fn release(env_dir: &Path) -> InvenvResult<()> {
        let path = lock_path(env_dir);
        remove_marker(&path)
            .map_err(|e| InvenvError::io(format!("removing lock {}", path.display()), e))
    }

    /// Whether a live process is known to reference `env_dir`
    pub fn is_in_use(&self, env_dir: &Path) -> bool {
        self.probe.is_referenced(env_dir) == Some(true)
    }

    /// Single non-blocking attempt. `None` if someone else holds the lock.
    pub fn try_acquire(&self, env_dir: &Path) -> InvenvResult<Option<EnvLock>> {
        let path = lock_path(env_dir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| InvenvError::io(format!("creating {}", parent.display()), e))?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Some(EnvLock {
                path,
                released: false,
            })),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(InvenvError::io(format!("creating lock {}", path.display()), e)),
        }
    }

    /// Wait for exclusive access to `env_dir`, reclaiming stale markers
    pub async fn acquire(&self, env_dir: &Path) -> InvenvResult<EnvLock> {
        let path = lock_path(env_dir);
        let liveness = self.probe.is_available();
        let time_budget = self.settings.stale_after + self.settings.poll_interval;
        let started = Instant::now();
        let mut attempt: u32 = 0;
        // Retries without sleeping, after a release or a reclaim
        let mut immediate_retries: u32 = 0;

        debug!("Acquiring lock {}", path.display());
        loop {
            attempt += 1;

            if let Some(lock) = self.try_acquire(env_dir)? {
                debug!("Lock acquired after {} attempt(s)", attempt);
                return Ok(lock);
            }

            let retry_now = match self.marker_state(env_dir) {
                MarkerState::Gone => true,
                MarkerState::Stale { reason, observed } => {
                    debug!("Clearing stale lock {} ({})", path.display(), reason);
                    clear_stale_marker(&path, observed)
                }
                MarkerState::Held => false,
            };
            if retry_now && immediate_retries < self.settings.max_attempts {
                immediate_retries += 1;
                continue;
            }

            let exhausted = if liveness {
                attempt >= self.settings.max_attempts
            } else {
                started.elapsed() >= time_budget
            };
            if exhausted {
                break;
            }

            if attempt == 1 {
                info!(
                    "Waiting for another process to finish with {}",
                    env_dir.display()
                );
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }

        Err(InvenvError::LockTimeout {
            path,
            attempts: attempt,
            waited_secs: started.elapsed().as_secs(),
        })
    }

    fn marker_state(&self, env_dir: &Path) -> MarkerState {
        let path = lock_path(env_dir);
        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return MarkerState::Gone,
            Err(e) => {
                debug!("Cannot stat lock {}: {}", path.display(), e);
                return MarkerState::Held;
            }
        };
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);

        if age > self.settings.stale_after {
            return MarkerState::Stale {
                reason: StaleReason::Expired(age),
                observed: modified,
            };
        }

        if age >= self.settings.liveness_grace
            && self.probe.is_referenced(env_dir) == Some(false)
        {
            return MarkerState::Stale {
                reason: StaleReason::Abandoned,
                observed: modified,
            };
        }

        MarkerState::Held
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Remove a marker judged stale, unless it was replaced in the meantime
fn clear_stale_marker(path: &Path, observed: SystemTime) -> bool {
    match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(current) if current != observed => {
            debug!("Lock {} was replaced, not clearing", path.display());
            false
        }
        Ok(_) => match remove_marker(path) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to clear stale lock {}: {}", path.display(), e);
                false
            }
        },
        Err(_) => true,
    }
}

fn remove_marker(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::liveness::NoProbe;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Probe with a fixed answer
    struct FixedProbe(Option<bool>);

    impl ProcessProbe for FixedProbe {
        fn is_referenced(&self, _needle: &Path) -> Option<bool> {
            self.0
        }
    }

    fn fast_settings() -> LockSettings {
        LockSettings {
            stale_after: Duration::from_secs(3600),
            poll_interval: Duration::from_millis(10),
            max_attempts: 5,
            liveness_grace: Duration::ZERO,
        }
    }

    fn manager(settings: LockSettings, alive: Option<bool>) -> LockManager {
        LockManager::new(settings, Arc::new(FixedProbe(alive)))
    }

    fn age_marker(path: &Path, age: Duration) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn lock_path_is_sibling() {
        assert_eq!(
            lock_path(Path::new("/home/u/.local/invenv/3fa9c0d1e2b4a6f8")),
            PathBuf::from("/home/u/.local/invenv/3fa9c0d1e2b4a6f8.lock")
        );
        assert_eq!(
            lock_path(Path::new("/project/.venv")),
            PathBuf::from("/project/.venv.lock")
        );
    }

    #[test]
    fn try_acquire_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join("env");
        let locks = manager(fast_settings(), Some(true));

        let first = locks.try_acquire(&env).unwrap().expect("first acquire");
        assert!(LockManager::is_locked(&env));
        assert!(locks.try_acquire(&env).unwrap().is_none());

        first.release().unwrap();
        assert!(!LockManager::is_locked(&env));
        assert!(locks.try_acquire(&env).unwrap().is_some());
    }

    #[test]
    fn marker_is_zero_bytes_and_creates_parent() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join("nested").join("root").join("env");
        let locks = manager(fast_settings(), Some(true));

        let lock = locks.try_acquire(&env).unwrap().unwrap();
        assert_eq!(fs::metadata(lock.path()).unwrap().len(), 0);
        assert!(!env.exists());
    }

    #[test]
    fn release_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join("env");

        LockManager::release(&env).unwrap();
        fs::File::create(lock_path(&env)).unwrap();
        LockManager::release(&env).unwrap();
        LockManager::release(&env).unwrap();
        assert!(!LockManager::is_locked(&env));
    }

    #[test]
    fn drop_releases_marker() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join("env");
        let locks = manager(fast_settings(), Some(true));

        {
            let _lock = locks.try_acquire(&env).unwrap().unwrap();
            assert!(LockManager::is_locked(&env));
        }
        assert!(!LockManager::is_locked(&env));
    }

    #[tokio::test]
    async fn acquire_times_out_on_live_holder() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join("env");
        let locks = manager(fast_settings(), Some(true));
        let _held = locks.try_acquire(&env).unwrap().unwrap();

        let err = locks.acquire(&env).await.unwrap_err();

        match err {
            InvenvError::LockTimeout { attempts, path, .. } => {
                assert_eq!(attempts, 5);
                assert_eq!(path, lock_path(&env));
            }
            other => panic!("expected LockTimeout, got {other:?}"),
        }
        assert!(LockManager::is_locked(&env));
    }

    #[tokio::test]
    async fn acquire_reclaims_expired_marker() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join("env");
        fs::File::create(lock_path(&env)).unwrap();
        age_marker(&lock_path(&env), Duration::from_secs(7200));

        // Holder looks alive, but the marker is too old
        let locks = manager(fast_settings(), Some(true));
        let lock = locks.acquire(&env).await.unwrap();
        assert_eq!(lock.path(), lock_path(&env));
    }

    #[tokio::test]
    async fn acquire_reclaims_abandoned_marker() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join("env");
        fs::File::create(lock_path(&env)).unwrap();

        let locks = manager(fast_settings(), Some(false));
        let started = Instant::now();
        locks.acquire(&env).await.unwrap();

        // Reclaimed without waiting for a poll interval
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn liveness_ignored_during_grace_period() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join("env");
        fs::File::create(lock_path(&env)).unwrap();

        let settings = LockSettings {
            liveness_grace: Duration::from_secs(3600),
            ..fast_settings()
        };
        let locks = manager(settings, Some(false));

        let err = locks.acquire(&env).await.unwrap_err();
        assert!(matches!(err, InvenvError::LockTimeout { .. }));
    }

    #[tokio::test]
    async fn without_probe_waits_for_stale_budget() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join("env");
        fs::File::create(lock_path(&env)).unwrap();

        let settings = LockSettings {
            stale_after: Duration::from_millis(200),
            poll_interval: Duration::from_millis(20),
            max_attempts: 1,
            liveness_grace: Duration::ZERO,
        };
        let locks = LockManager::new(settings, Arc::new(NoProbe));

        let started = Instant::now();
        locks.acquire(&env).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join("env");
        let locks = manager(
            LockSettings {
                max_attempts: 200,
                ..fast_settings()
            },
            Some(true),
        );
        let held = locks.try_acquire(&env).unwrap().unwrap();

        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            held.release().unwrap();
        });

        let lock = locks.acquire(&env).await.unwrap();
        releaser.await.unwrap();
        assert!(lock.path().exists());
    }

    #[test]
    fn replaced_marker_is_not_cleared() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.lock");
        fs::File::create(&path).unwrap();
        let observed = SystemTime::now() - Duration::from_secs(7200);

        assert!(!clear_stale_marker(&path, observed));
        assert!(path.exists());

        let current = fs::metadata(&path).unwrap().modified().unwrap();
        assert!(clear_stale_marker(&path, current));
        assert!(!path.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_holders_are_serialized() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join("env");
        let locks = manager(
            LockSettings {
                max_attempts: 1000,
                poll_interval: Duration::from_millis(5),
                ..fast_settings()
            },
            Some(true),
        );
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let env = env.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            tasks.push(tokio::spawn(async move {
                let lock = locks.acquire(&env).await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                lock.release().unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
