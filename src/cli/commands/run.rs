//! Run command - execute a script inside its environment

use super::{auto_gc, current_dir, ensure_script_env, resolve_script};
use crate::builder::env_python;
use crate::cli::args::{Invocation, RunArgs};
use crate::error::{InvenvError, InvenvResult};
use crate::settings::Settings;
use crate::ui::{TaskSpinner, UiContext};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Execute the run command. On Unix this does not return on success: the
/// process is replaced by the script's interpreter.
pub async fn execute(args: RunArgs, settings: &Settings, ctx: &UiContext) -> InvenvResult<()> {
    let invocation = Invocation::parse(&args.invocation)?;
    let cwd = current_dir()?;
    let script = resolve_script(&invocation.script, &cwd)?;

    let mut spinner = TaskSpinner::new(ctx);
    let ready = ensure_script_env(&script, &args.env, &cwd, settings, &mut spinner).await?;

    spinner.message("Cleaning up unused environments...");
    auto_gc(settings).await;
    spinner.clear();

    let command = script_command(&ready.dir, &invocation);
    debug!("Running {:?}", command);
    exec(command)
}

/// `<env>/bin/python script args` with the extra variables set
fn script_command(env_dir: &Path, invocation: &Invocation) -> Command {
    let mut command = Command::new(env_python(env_dir));
    command
        .arg(&invocation.script)
        .args(&invocation.args)
        .envs(invocation.env.iter().map(|(k, v)| (k, v)));
    command
}

#[cfg(unix)]
fn exec(mut command: Command) -> InvenvResult<()> {
    use std::os::unix::process::CommandExt;

    let program = command.get_program().to_string_lossy().into_owned();
    // Only returns on failure
    let err = command.exec();
    Err(InvenvError::command_failed(program, err))
}

#[cfg(not(unix))]
fn exec(mut command: Command) -> InvenvResult<()> {
    let program = command.get_program().to_string_lossy().into_owned();
    let status = command
        .status()
        .map_err(|e| InvenvError::command_failed(program, e))?;
    std::process::exit(status.code().unwrap_or(1));
}
