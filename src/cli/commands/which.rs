//! Which command - print a script's environment directory

use super::{current_dir, ensure_script_env, resolve_script};
use crate::cli::args::WhichArgs;
use crate::error::InvenvResult;
use crate::settings::Settings;
use crate::ui::{TaskSpinner, UiContext};

/// Execute the which command
pub async fn execute(args: WhichArgs, settings: &Settings, ctx: &UiContext) -> InvenvResult<()> {
    let cwd = current_dir()?;
    let script = resolve_script(&args.script, &cwd)?;

    let mut spinner = TaskSpinner::new(ctx);
    let ready = ensure_script_env(&script, &args.env, &cwd, settings, &mut spinner).await?;
    spinner.clear();

    println!("{}", ready.dir.display());
    Ok(())
}
