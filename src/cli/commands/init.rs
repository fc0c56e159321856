//! Init command - create or update a project-local environment

use super::current_dir;
use crate::cache::{EnvLocation, EnvRequest, Outcome};
use crate::cli::args::InitArgs;
use crate::error::{InvenvError, InvenvResult};
use crate::interpreter::Interpreter;
use crate::requirements;
use crate::settings::Settings;
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::{Component, Path, PathBuf};

/// Execute the init command
pub async fn execute(args: InitArgs, settings: &Settings, ctx: &UiContext) -> InvenvResult<()> {
    let cwd = current_dir()?;
    let dir = environment_dir(&cwd, &args.dir)?;

    let mut spinner = TaskSpinner::new(ctx);
    spinner.start("Gathering information about the environment...");
    let dependency_file = requirements::for_directory(&cwd, args.env.requirements_file.as_deref())?;
    let interpreter = Interpreter::discover(args.env.python.as_deref()).await?;

    let request = EnvRequest {
        interpreter: interpreter.path,
        interpreter_version: interpreter.version,
        dependency_file,
        location: EnvLocation::Directory(dir.clone()),
    };

    spinner.message("Ensuring virtual environment...");
    let ready = settings
        .coordinator()
        .ensure_ready(&request, args.env.new_environment)
        .await?;
    spinner.clear();

    if !settings.silent {
        ui::step_ok(ctx, &summary(ready.outcome, &args.dir, &request));
    }
    Ok(())
}

/// Resolve `--dir` against `cwd`. The working directory, its ancestors and
/// paths leaving it through `..` are refused.
fn environment_dir(cwd: &Path, dir: &Path) -> InvenvResult<PathBuf> {
    let climbs = dir.components().any(|c| c == Component::ParentDir);
    let path: PathBuf = cwd.join(dir).components().collect();

    if climbs || cwd.starts_with(&path) {
        return Err(InvenvError::User(format!(
            "{} cannot hold an environment, use a dedicated directory such as .venv",
            dir.display()
        )));
    }
    Ok(path)
}

fn summary(outcome: Outcome, dir: &Path, request: &EnvRequest) -> String {
    let installed = match &request.dependency_file {
        Some(file) => format!(
            " with {}",
            file.file_name().unwrap_or_default().to_string_lossy()
        ),
        None => String::new(),
    };

    match outcome {
        Outcome::Built => format!("Created {}{}", dir.display(), installed),
        Outcome::Reinstalled => format!("Updated {}{}", dir.display(), installed),
        Outcome::Reused => format!("{} is up to date", dir.display()),
    }
}
