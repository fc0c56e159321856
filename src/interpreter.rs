//! Python interpreter lookup

use crate::error::{InvenvError, InvenvResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Interpreter used when none is named
pub const DEFAULT_INTERPRETER: &str = "python3";

/// A resolved interpreter and its version string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub path: PathBuf,
    /// Trimmed `--version` output, e.g. `Python 3.11.4`
    pub version: String,
}

impl Interpreter {
    /// Resolve `name` on `PATH` and query its version
    pub async fn discover(name: Option<&str>) -> InvenvResult<Self> {
        let path = resolve(name.unwrap_or(DEFAULT_INTERPRETER))?;
        let version = version(&path).await?;
        debug!("Python interpreter {} has version {}", path.display(), version);
        Ok(Self { path, version })
    }
}

/// Find an interpreter by name or path.
///
/// Bare names are looked up on `PATH`; anything containing a separator must
/// exist as given.
pub fn resolve(name: &str) -> InvenvResult<PathBuf> {
    let not_found = |reason: String| InvenvError::InterpreterNotFound {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(not_found("empty interpreter name".to_string()));
    }

    which::which(name).map_err(|e| not_found(e.to_string()))
}

/// Run `<python> --version` and return its trimmed combined output.
///
/// Python 2 prints its version on stderr, hence both streams.
pub async fn version(interpreter: &Path) -> InvenvResult<String> {
    let fail = |reason: String| InvenvError::InterpreterVersion {
        path: interpreter.to_path_buf(),
        reason,
    };

    let output = Command::new(interpreter)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| fail(e.to_string()))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let combined = combined.trim().to_string();

    if !output.status.success() {
        return Err(fail(format!("exited with {}: {}", output.status, combined)));
    }
    if combined.is_empty() {
        return Err(fail("no version printed".to_string()));
    }
    Ok(combined)
}
