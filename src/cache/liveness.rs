//! Process liveness probing for lock staleness detection
//!
//! A lock marker carries no owner information. Instead, a holder is presumed
//! alive while some running process mentions the environment directory on its
//! command line (the venv/pip subprocesses of a build, or a script running on
//! the environment's interpreter).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Answers whether any running process references a path
pub trait ProcessProbe: Send + Sync {
    /// `Some(true)` if a process command line contains `needle`, `Some(false)`
    /// if none does, `None` if processes cannot be enumerated here.
    fn is_referenced(&self, needle: &Path) -> Option<bool>;

    /// Whether this probe can ever answer
    fn is_available(&self) -> bool {
        true
    }
}

/// Scans `/proc/<pid>/cmdline` (Linux)
#[derive(Debug, Clone)]
pub struct ProcScanner {
    proc_root: PathBuf,
}

impl ProcScanner {
    /// Scanner over the host's `/proc`
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Scanner over an alternative procfs mount
    pub fn with_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl Default for ProcScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for ProcScanner {
    fn is_available(&self) -> bool {
        self.proc_root.is_dir()
    }

    fn is_referenced(&self, needle: &Path) -> Option<bool> {
        let entries = match std::fs::read_dir(&self.proc_root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot scan {}: {}", self.proc_root.display(), e);
                return None;
            }
        };
        let needle = needle.to_string_lossy();

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }

            // Processes may exit while we scan; unreadable entries are skipped
            let Ok(raw) = std::fs::read(entry.path().join("cmdline")) else {
                continue;
            };
            let cmdline = String::from_utf8_lossy(&raw).replace('\0', " ");
            if cmdline.contains(needle.as_ref()) {
                debug!("Process {} references {}", name, needle);
                return Some(true);
            }
        }

        Some(false)
    }
}

/// Probe for platforms without process introspection
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl ProcessProbe for NoProbe {
    fn is_referenced(&self, _needle: &Path) -> Option<bool> {
        None
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// The best probe available on this platform
pub fn default_probe() -> Arc<dyn ProcessProbe> {
    if cfg!(target_os = "linux") {
        Arc::new(ProcScanner::new())
    } else {
        Arc::new(NoProbe)
    }
}
