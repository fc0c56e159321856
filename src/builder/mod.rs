//! Virtual environment creation and requirements installation
//!
//! The cache coordinator drives builds through the [`EnvBuilder`] trait so
//! that locking and change detection can be exercised without a Python
//! toolchain. [`VenvBuilder`] is the implementation backed by real tools.

pub mod command;

pub use command::{CommandRunner, OutputMode, ToolCommand};

use crate::config::Creator;
use crate::error::{InvenvError, InvenvResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Creates environments and installs requirements into them
#[async_trait]
pub trait EnvBuilder: Send + Sync {
    /// Create a fresh environment at `env_dir` for `interpreter`
    async fn create(&self, env_dir: &Path, interpreter: &Path) -> InvenvResult<()>;

    /// Install a requirements file into an existing environment
    async fn install(&self, env_dir: &Path, dependency_file: &Path) -> InvenvResult<()>;
}

/// Interpreter inside an environment directory
pub fn env_python(env_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        env_dir.join("Scripts").join("python.exe")
    } else {
        env_dir.join("bin").join("python")
    }
}

/// Builds environments with `python -m venv` or `virtualenv`, installs with pip
#[derive(Debug, Clone, Default)]
pub struct VenvBuilder {
    runner: CommandRunner,
    creator: Creator,
}

impl VenvBuilder {
    pub fn new(runner: CommandRunner, creator: Creator) -> Self {
        Self { runner, creator }
    }

    /// Pick the creation command for `interpreter`
    async fn creation_command(&self, env_dir: &Path, interpreter: &Path) -> InvenvResult<ToolCommand> {
        let use_venv = match self.creator {
            Creator::Venv => true,
            Creator::Virtualenv => false,
            Creator::Auto => self.has_venv_module(interpreter).await,
        };

        if use_venv {
            return Ok(ToolCommand::new(interpreter)
                .args(["-m", "venv"])
                .arg(env_dir));
        }

        let virtualenv = which::which("virtualenv").map_err(|e| InvenvError::ToolNotFound {
            name: "virtualenv".to_string(),
            hint: if self.creator == Creator::Auto {
                format!(
                    "{} has no usable venv module and virtualenv is unavailable ({})",
                    interpreter.display(),
                    e
                )
            } else {
                e.to_string()
            },
        })?;

        Ok(ToolCommand::new(virtualenv)
            .arg("--python")
            .arg(interpreter)
            .arg(env_dir))
    }

    /// Debian-style interpreters ship venv without ensurepip, which breaks `-m venv`
    async fn has_venv_module(&self, interpreter: &Path) -> bool {
        let probe = ToolCommand::new(interpreter).args(["-c", "import venv, ensurepip"]);
        let available = self.runner.succeeds(&probe).await;
        debug!(
            "venv module {} for {}",
            if available { "available" } else { "unavailable" },
            interpreter.display()
        );
        available
    }
}

#[async_trait]
impl EnvBuilder for VenvBuilder {
    async fn create(&self, env_dir: &Path, interpreter: &Path) -> InvenvResult<()> {
        let wrap = |source: InvenvError| InvenvError::EnvCreate {
            path: env_dir.to_path_buf(),
            source: Box::new(source),
        };

        let tool = self.creation_command(env_dir, interpreter).await.map_err(|e| match e {
            // Missing tools are reported as is
            e @ InvenvError::ToolNotFound { .. } => e,
            e => wrap(e),
        })?;

        info!("Creating virtual environment in {}", env_dir.display());
        self.runner.run(&tool).await.map_err(wrap)
    }

    async fn install(&self, env_dir: &Path, dependency_file: &Path) -> InvenvResult<()> {
        let pip = ToolCommand::new(env_python(env_dir))
            .args(["-m", "pip", "install", "--no-input", "-r"])
            .arg(dependency_file);

        info!("Installing requirements from {}", dependency_file.display());
        self.runner
            .run(&pip)
            .await
            .map_err(|source| InvenvError::DependencyInstall {
                file: dependency_file.to_path_buf(),
                source: Box::new(source),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn env_python_location() {
        let python = env_python(Path::new("/envs/abc"));
        if cfg!(windows) {
            assert!(python.ends_with("Scripts/python.exe"));
        } else {
            assert_eq!(python, PathBuf::from("/envs/abc/bin/python"));
        }
    }

    #[tokio::test]
    async fn forced_venv_uses_interpreter_module() {
        let builder = VenvBuilder::new(CommandRunner::default(), Creator::Venv);
        let tool = builder
            .creation_command(Path::new("/envs/abc"), Path::new("/usr/bin/python3"))
            .await
            .unwrap();

        assert_eq!(tool.display(), "/usr/bin/python3 -m venv /envs/abc");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn create_failure_is_wrapped() {
        let dir = TempDir::new().unwrap();
        // `false` accepts any arguments and fails
        let builder = VenvBuilder::new(CommandRunner::default(), Creator::Venv);

        let err = builder
            .create(&dir.path().join("env"), Path::new("false"))
            .await
            .unwrap_err();

        match err {
            InvenvError::EnvCreate { source, .. } => {
                assert!(matches!(*source, InvenvError::ToolFailed { code: 1, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn install_without_environment_fails() {
        let dir = TempDir::new().unwrap();
        let requirements = dir.path().join("requirements.txt");
        std::fs::write(&requirements, "requests\n").unwrap();

        let err = VenvBuilder::default()
            .install(&dir.path().join("missing-env"), &requirements)
            .await
            .unwrap_err();

        match err {
            InvenvError::DependencyInstall { file, source } => {
                assert_eq!(file, requirements);
                assert!(matches!(*source, InvenvError::CommandFailed { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
