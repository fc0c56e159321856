//! Environment fingerprints
//!
//! An environment is identified by the content of its requirements file and
//! the version of the interpreter it was built for. Same inputs = same
//! directory, so scripts with identical requirements share one environment.

use crate::error::{InvenvError, InvenvResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tokio::fs;

/// Deterministic identity of an environment, used as its directory name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Number of digest bytes kept (16 hex characters)
    const BYTES: usize = 8;

    /// Compute the fingerprint for a requirements file content and interpreter version.
    ///
    /// `None` means no requirements file is designated; it never collides with
    /// a real file, including an empty one.
    pub fn compute(dependency_content: Option<&[u8]>, interpreter_version: &str) -> Self {
        let mut hasher = Sha256::new();
        match dependency_content {
            Some(content) => {
                hasher.update(b"requirements:");
                hasher.update((content.len() as u64).to_le_bytes());
                hasher.update(content);
            }
            None => hasher.update(b"no-requirements:"),
        }
        hasher.update(b"python:");
        hasher.update(interpreter_version.as_bytes());

        let digest = hasher.finalize();
        Self(hex::encode(&digest[..Self::BYTES]))
    }

    /// The fingerprint as a directory-safe string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash of a requirements file's content, first 12 hex chars of SHA256.
///
/// Empty when there is no requirements file.
pub fn dependency_hash(dependency_content: Option<&[u8]>) -> String {
    match dependency_content {
        Some(content) => {
            let digest = Sha256::digest(content);
            hex::encode(&digest[..6])
        }
        None => String::new(),
    }
}

/// Read a requirements file, if one is designated
pub async fn read_dependency_file(path: Option<&Path>) -> InvenvResult<Option<Vec<u8>>> {
    let Some(path) = path else {
        return Ok(None);
    };

    let content = fs::read(path)
        .await
        .map_err(|e| InvenvError::DependencyFileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(Some(content))
}
