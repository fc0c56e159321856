//! CLI command implementations

pub mod cache;
pub mod config;
pub mod init;
pub mod run;
pub mod which;

pub use cache::execute as cache;
pub use config::execute as config;
pub use init::execute as init;
pub use run::execute as run;
pub use which::execute as which;

use crate::cache::{EnvLocation, EnvRequest, ReadyEnv};
use crate::cli::args::EnvArgs;
use crate::error::{InvenvError, InvenvResult};
use crate::interpreter::Interpreter;
use crate::requirements;
use crate::settings::Settings;
use crate::ui::TaskSpinner;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Absolute path of an existing script
pub(crate) fn resolve_script(script: &Path, cwd: &Path) -> InvenvResult<PathBuf> {
    let path = cwd.join(script);
    if path.is_file() {
        Ok(path)
    } else {
        Err(InvenvError::ScriptNotFound(path))
    }
}

pub(crate) fn current_dir() -> InvenvResult<PathBuf> {
    std::env::current_dir().map_err(|e| InvenvError::io("getting current directory", e))
}

/// Make the environment for `script` ready
pub(crate) async fn ensure_script_env(
    script: &Path,
    env: &EnvArgs,
    cwd: &Path,
    settings: &Settings,
    spinner: &mut TaskSpinner,
) -> InvenvResult<ReadyEnv> {
    spinner.start("Parsing script file...");
    let dependency_file =
        requirements::for_script(script, env.requirements_file.as_deref(), cwd)?;
    let interpreter = Interpreter::discover(env.python.as_deref()).await?;

    debug!("Script: {}", script.display());
    debug!("Python interpreter: {}", interpreter.path.display());

    let request = EnvRequest {
        interpreter: interpreter.path,
        interpreter_version: interpreter.version,
        dependency_file,
        location: EnvLocation::Fingerprinted,
    };

    spinner.message("Configuring virtual environment...");
    let ready = settings
        .coordinator()
        .ensure_ready(&request, env.new_environment)
        .await?;
    debug!("Directory with environment: {}", ready.dir.display());

    Ok(ready)
}

/// Automatic reclamation of unused environments. Never fails the command.
pub(crate) async fn auto_gc(settings: &Settings) {
    let Some(max_age) = settings.gc_max_age else {
        return;
    };

    match settings.coordinator().collect_garbage(max_age, false).await {
        Ok(report) if !report.removed.is_empty() => {
            debug!("Removed {} unused environment(s)", report.removed.len())
        }
        Ok(_) => {}
        Err(e) => warn!("Cleaning unused environments failed: {}", e),
    }
}
