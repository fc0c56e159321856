//! On-disk environment store
//!
//! Maps fingerprints to environment directories under the cache root and
//! persists a small record next to each environment describing how it was
//! built. The record decides whether an environment can be reused.

use crate::cache::fingerprint::Fingerprint;
use crate::cache::lock::lock_path;
use crate::error::{InvenvError, InvenvResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::SystemTime;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

/// Name of the record file inside an environment directory
pub const RECORD_FILE: &str = "invenv.toml";

/// Zero-byte file touched whenever a cached environment is reused
const USAGE_MARKER: &str = ".invenv-used";

/// Written by `venv` and `virtualenv` into every environment they create
const VENV_CONFIG: &str = "pyvenv.cfg";

/// Build information persisted inside an environment directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvRecord {
    /// Interpreter the environment was created from
    pub interpreter: PathBuf,

    /// `--version` output of that interpreter at build time
    pub interpreter_version: String,

    /// Hash of the last successfully installed requirements file (empty if none)
    #[serde(default)]
    pub dependency_hash: String,

    /// When the environment was created
    pub created_at: DateTime<Utc>,

    /// When the record was last rewritten
    pub updated_at: DateTime<Utc>,
}

impl EnvRecord {
    /// Record for a freshly created environment with nothing installed yet
    pub fn new(interpreter: &Path, interpreter_version: &str) -> Self {
        let now = Utc::now();
        Self {
            interpreter: interpreter.to_path_buf(),
            interpreter_version: interpreter_version.to_string(),
            dependency_hash: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark a requirements file hash as installed
    pub fn set_dependency_hash(&mut self, hash: &str) {
        self.dependency_hash = hash.to_string();
        self.updated_at = Utc::now();
    }
}

/// Outcome of checking an environment against the current inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    /// Usable as is
    Ready,
    /// Interpreter matches but requirements are not (yet) installed
    NeedsInstall,
    /// Must be deleted and rebuilt
    Invalid(String),
}

/// An environment directory found under the cache root
#[derive(Debug, Clone)]
pub struct EnvEntry {
    /// Directory name (the fingerprint)
    pub name: String,
    /// Absolute directory path
    pub path: PathBuf,
    /// Parsed record, `None` if missing or corrupt
    pub record: Option<EnvRecord>,
    /// Whether a lock marker currently exists
    pub locked: bool,
    /// Most recent of directory mtime and last reuse
    pub last_used: Option<DateTime<Utc>>,
}

impl EnvEntry {
    /// Check if this environment was last used more than `max_age` ago
    pub fn is_unused_for(&self, max_age: std::time::Duration) -> bool {
        let Some(last_used) = self.last_used else {
            return false;
        };
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => last_used < Utc::now() - max_age,
            Err(_) => false,
        }
    }
}

/// Environment directories under a single cache root
#[derive(Debug, Clone)]
pub struct EnvironmentStore {
    root: PathBuf,
}

impl EnvironmentStore {
    /// Create a store rooted at `root` (not created until first build)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a fingerprint. Pure path construction.
    pub fn locate(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.as_str())
    }

    /// Read the record of an environment.
    ///
    /// A missing, unreadable or unparseable record is a cache miss.
    pub async fn read_record(&self, env_dir: &Path) -> Option<EnvRecord> {
        let path = env_dir.join(RECORD_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("No usable record at {}: {}", path.display(), e);
                return None;
            }
        };

        match toml::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("Ignoring corrupt record {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Decide whether an environment can be reused for the current inputs
    pub fn validate(
        record: Option<&EnvRecord>,
        interpreter_version: &str,
        dependency_hash: &str,
    ) -> Validity {
        let Some(record) = record else {
            return Validity::Invalid("no environment record".to_string());
        };

        // Compiled packages are tied to the interpreter they were built against
        if record.interpreter_version != interpreter_version {
            return Validity::Invalid(format!(
                "built with {}, want {}",
                record.interpreter_version, interpreter_version
            ));
        }

        if record.dependency_hash != dependency_hash {
            return Validity::NeedsInstall;
        }

        Validity::Ready
    }

    /// Persist a record, replacing any previous one atomically
    pub async fn write_record(&self, env_dir: &Path, record: &EnvRecord) -> InvenvResult<()> {
        let content = toml::to_string_pretty(record)?;
        let final_path = env_dir.join(RECORD_FILE);
        let tmp_path = env_dir.join(format!(".{}.{}.tmp", RECORD_FILE, Uuid::new_v4().simple()));

        fs::write(&tmp_path, content)
            .await
            .map_err(|e| InvenvError::io(format!("writing record {}", tmp_path.display()), e))?;

        if let Err(e) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(InvenvError::io(
                format!("replacing record {}", final_path.display()),
                e,
            ));
        }

        debug!("Wrote record {}", final_path.display());
        Ok(())
    }

    /// Delete an environment directory tree. A missing directory is not an error.
    pub async fn remove(&self, env_dir: &Path) -> InvenvResult<()> {
        remove_dir(env_dir).await
    }

    /// Whether `env_dir` may be deleted to build an environment in its place:
    /// it is missing, empty, or already a virtual environment.
    pub async fn is_replaceable(&self, env_dir: &Path) -> bool {
        if env_dir.join(RECORD_FILE).is_file() || env_dir.join(VENV_CONFIG).is_file() {
            return true;
        }
        match fs::read_dir(env_dir).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
            Err(e) => e.kind() == std::io::ErrorKind::NotFound,
        }
    }

    /// Most recent use of an environment, `None` if it is gone
    pub async fn last_used(&self, env_dir: &Path) -> Option<DateTime<Utc>> {
        last_used(env_dir).await
    }

    /// Refresh the usage marker of an environment. Failures are only logged.
    pub fn mark_used(&self, env_dir: &Path) {
        let marker = env_dir.join(USAGE_MARKER);
        let touched = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&marker)
            .and_then(|file| file.set_modified(SystemTime::now()));

        if let Err(e) = touched {
            debug!("Failed to touch {}: {}", marker.display(), e);
        }
    }

    /// List all environment directories under the root, sorted by name
    pub async fn list(&self) -> InvenvResult<Vec<EnvEntry>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }

        let mut entries = fs::read_dir(&self.root).await.map_err(|e| {
            InvenvError::io(format!("reading cache root {}", self.root.display()), e)
        })?;

        let mut envs = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| InvenvError::io("reading cache entry", e))?
        {
            let path = entry.path();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }

            envs.push(EnvEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                record: self.read_record(&path).await,
                locked: lock_path(&path).exists(),
                last_used: last_used(&path).await,
                path,
            });
        }

        envs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(envs)
    }
}

/// Most recent of the directory mtime and the usage marker mtime
async fn last_used(env_dir: &Path) -> Option<DateTime<Utc>> {
    let dir_mtime = fs::metadata(env_dir).await.and_then(|m| m.modified()).ok();
    let marker_mtime = fs::metadata(env_dir.join(USAGE_MARKER))
        .await
        .and_then(|m| m.modified())
        .ok();

    dir_mtime.max(marker_mtime).map(DateTime::<Utc>::from)
}

/// Recursively delete a directory, escalating through sudo on permission errors
pub async fn remove_dir(dir: &Path) -> InvenvResult<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!("Removed {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied && !is_root() => {
            warn!(
                "Permission denied removing {}, retrying with sudo",
                dir.display()
            );
            remove_dir_with_sudo(dir).await
        }
        Err(e) => Err(InvenvError::RemoveFailed {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

async fn remove_dir_with_sudo(dir: &Path) -> InvenvResult<()> {
    let status = Command::new("sudo")
        .args(["rm", "-rf", "--"])
        .arg(dir)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| InvenvError::RemoveFailed {
            path: dir.to_path_buf(),
            reason: format!("running sudo: {}", e),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(InvenvError::RemoveFailed {
            path: dir.to_path_buf(),
            reason: format!("sudo rm -rf exited with {}", status),
        })
    }
}

fn is_root() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}
