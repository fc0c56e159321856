//! Requirements file discovery
//!
//! For a script `tool.py` the first existing of these, next to the script,
//! is used:
//!
//! 1. `requirements_tool.txt`
//! 2. `tool_requirements.txt`
//! 3. `requirements.txt`

use crate::error::{InvenvError, InvenvResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Conventional requirements file name
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Candidate requirements files for a script, in order of preference
pub fn candidates(script: &Path) -> Vec<PathBuf> {
    let dir = script.parent().unwrap_or_else(|| Path::new(""));
    let stem = script
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let stem = stem.strip_suffix(".py").unwrap_or(stem.as_ref());

    vec![
        dir.join(format!("requirements_{}.txt", stem)),
        dir.join(format!("{}_requirements.txt", stem)),
        dir.join(REQUIREMENTS_FILE),
    ]
}

/// Resolve an explicitly given requirements file against `cwd`. It must exist.
pub fn resolve_override(file: &Path, cwd: &Path) -> InvenvResult<PathBuf> {
    let path = if file.is_absolute() {
        file.to_path_buf()
    } else {
        cwd.join(file)
    };

    if path.is_file() {
        Ok(path)
    } else {
        Err(InvenvError::DependencyFileNotFound(path))
    }
}

/// Requirements file for `script` (an absolute path).
///
/// `None` when no override is given and no candidate exists.
pub fn for_script(
    script: &Path,
    override_file: Option<&Path>,
    cwd: &Path,
) -> InvenvResult<Option<PathBuf>> {
    if let Some(file) = override_file {
        return resolve_override(file, cwd).map(Some);
    }

    for candidate in candidates(script) {
        if candidate.is_file() {
            debug!("Using requirements file {}", candidate.display());
            return Ok(Some(candidate));
        }
        debug!("No requirements file at {}", candidate.display());
    }
    Ok(None)
}

/// Requirements file for a project directory: the override, or
/// `requirements.txt` inside it if present
pub fn for_directory(dir: &Path, override_file: Option<&Path>) -> InvenvResult<Option<PathBuf>> {
    if let Some(file) = override_file {
        return resolve_override(file, dir).map(Some);
    }

    let default = dir.join(REQUIREMENTS_FILE);
    Ok(default.is_file().then_some(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::write(path, "requests\n").unwrap();
    }

    #[test]
    fn candidate_order() {
        let names: Vec<PathBuf> = candidates(Path::new("/work/fetch.py"));
        assert_eq!(
            names,
            vec![
                PathBuf::from("/work/requirements_fetch.txt"),
                PathBuf::from("/work/fetch_requirements.txt"),
                PathBuf::from("/work/requirements.txt"),
            ]
        );

        // Only a trailing .py is stripped
        assert_eq!(
            candidates(Path::new("/work/run"))[0],
            PathBuf::from("/work/requirements_run.txt")
        );
    }

    #[test]
    fn most_specific_candidate_wins() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("fetch.py");
        touch(&script);
        assert_eq!(for_script(&script, None, dir.path()).unwrap(), None);

        touch(&dir.path().join("requirements.txt"));
        assert_eq!(
            for_script(&script, None, dir.path()).unwrap(),
            Some(dir.path().join("requirements.txt"))
        );

        touch(&dir.path().join("fetch_requirements.txt"));
        touch(&dir.path().join("requirements_fetch.txt"));
        assert_eq!(
            for_script(&script, None, dir.path()).unwrap(),
            Some(dir.path().join("requirements_fetch.txt"))
        );
    }

    #[test]
    fn override_is_relative_to_cwd() {
        let cwd = TempDir::new().unwrap();
        let scripts = TempDir::new().unwrap();
        let script = scripts.path().join("fetch.py");
        touch(&scripts.path().join("requirements.txt"));
        touch(&cwd.path().join("pinned.txt"));

        assert_eq!(
            for_script(&script, Some(Path::new("pinned.txt")), cwd.path()).unwrap(),
            Some(cwd.path().join("pinned.txt"))
        );
    }

    #[test]
    fn missing_override_fails() {
        let cwd = TempDir::new().unwrap();
        let err = for_script(
            &cwd.path().join("fetch.py"),
            Some(Path::new("absent.txt")),
            cwd.path(),
        )
        .unwrap_err();

        assert!(matches!(err, InvenvError::DependencyFileNotFound(p) if p.ends_with("absent.txt")));
    }

    #[test]
    fn directory_lookup() {
        let dir = TempDir::new().unwrap();
        assert_eq!(for_directory(dir.path(), None).unwrap(), None);

        touch(&dir.path().join("requirements.txt"));
        assert_eq!(
            for_directory(dir.path(), None).unwrap(),
            Some(dir.path().join("requirements.txt"))
        );
    }
}
