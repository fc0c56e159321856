//! Error types for invenv
//!
//! All modules use `InvenvResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for invenv operations
pub type InvenvResult<T> = Result<T, InvenvError>;

/// All errors that can occur in invenv
#[derive(Error, Debug)]
pub enum InvenvError {
    // Input errors
    #[error("Script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("Requirements file not found: {0}")]
    DependencyFileNotFound(PathBuf),

    #[error("Failed to read requirements file {path}: {source}")]
    DependencyFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Python interpreter not found: {name}: {reason}")]
    InterpreterNotFound { name: String, reason: String },

    #[error("Failed to get version of {path}: {reason}")]
    InterpreterVersion { path: PathBuf, reason: String },

    // Lock errors
    #[error("Could not acquire environment lock {path} after {attempts} attempts ({waited_secs}s)")]
    LockTimeout {
        path: PathBuf,
        attempts: u32,
        waited_secs: u64,
    },

    // Build errors
    #[error("Required tool not found: {name}. {hint}")]
    ToolNotFound { name: String, hint: String },

    #[error("Failed to create virtual environment {path}")]
    EnvCreate {
        path: PathBuf,
        #[source]
        source: Box<InvenvError>,
    },

    #[error("Failed to install requirements from {file}")]
    DependencyInstall {
        file: PathBuf,
        #[source]
        source: Box<InvenvError>,
    },

    #[error("{command} exited with code {code}{}", format_tool_output(.output))]
    ToolFailed {
        command: String,
        code: i32,
        output: String,
    },

    #[error("Failed to delete directory {path}: {reason}")]
    RemoveFailed { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

fn format_tool_output(output: &str) -> String {
    if output.is_empty() {
        String::new()
    } else {
        format!(":\n{}", output)
    }
}

impl InvenvError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::LockTimeout { .. } => Some(
                "Another invenv process may still be building this environment. \
                 If none is running, delete the .lock file and retry",
            ),
            Self::InterpreterNotFound { .. } => Some("Pass an interpreter with: invenv run -p python3.X"),
            Self::ToolNotFound { .. } => {
                Some("Install the venv module (e.g. python3-venv) or virtualenv")
            }
            Self::EnvCreate { .. } | Self::DependencyInstall { .. } => {
                Some("Re-run with -vv to stream the tool output")
            }
            _ => None,
        }
    }
}
