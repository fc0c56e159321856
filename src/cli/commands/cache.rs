//! Cache command - manage cached environments

use crate::cache::{EnvEntry, GcReport};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::error::InvenvResult;
use crate::settings::Settings;
use crate::ui::{self, UiContext};
use console::style;
use std::time::Duration;

/// Execute the cache command
pub async fn execute(args: CacheArgs, settings: &Settings, ctx: &UiContext) -> InvenvResult<()> {
    match args.action {
        CacheAction::List { format } => list_envs(settings, format).await,
        CacheAction::Gc { days, dry_run } => gc_envs(settings, ctx, days, dry_run).await,
        CacheAction::Clear { yes } => clear_envs(settings, &ctx.clone().with_auto_yes(yes)).await,
    }
}

/// List all cached environments
async fn list_envs(settings: &Settings, format: OutputFormat) -> InvenvResult<()> {
    let envs = settings.coordinator().store().list().await?;

    match format {
        OutputFormat::Table => print_env_table(settings, &envs),
        OutputFormat::Json => print_env_json(&envs)?,
        OutputFormat::Plain => print_env_plain(&envs),
    }

    Ok(())
}

fn env_state(env: &EnvEntry) -> &'static str {
    match (&env.record, env.locked) {
        (_, true) => "building",
        (Some(_), false) => "ready",
        (None, false) => "broken",
    }
}

fn print_env_table(settings: &Settings, envs: &[EnvEntry]) {
    if envs.is_empty() {
        println!("No environments in {}", settings.cache_root().display());
        return;
    }

    println!(
        "{:<18} {:<10} {:<16} {:<14} {:<18}",
        "ENVIRONMENT", "STATE", "PYTHON", "REQUIREMENTS", "LAST USED"
    );
    println!("{}", "-".repeat(78));

    for env in envs {
        let state = env_state(env);
        let state_display = match state {
            "ready" => style(format!("{:<10}", state)).green().to_string(),
            "building" => style(format!("{:<10}", state)).yellow().to_string(),
            _ => style(format!("{:<10}", state)).red().to_string(),
        };

        let (python, requirements) = match &env.record {
            Some(record) => (
                record.interpreter_version.clone(),
                if record.dependency_hash.is_empty() {
                    "-".to_string()
                } else {
                    record.dependency_hash.clone()
                },
            ),
            None => ("-".to_string(), "-".to_string()),
        };

        let last_used = env
            .last_used
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<18} {} {:<16} {:<14} {:<18}",
            env.name, state_display, python, requirements, last_used
        );
    }

    println!();
    println!("Total: {} environment(s)", envs.len());
}

fn print_env_json(envs: &[EnvEntry]) -> InvenvResult<()> {
    #[derive(serde::Serialize)]
    struct EnvJson<'a> {
        name: &'a str,
        path: String,
        state: &'static str,
        interpreter: Option<String>,
        interpreter_version: Option<&'a str>,
        dependency_hash: Option<&'a str>,
        created_at: Option<String>,
        last_used: Option<String>,
    }

    let json_envs: Vec<EnvJson> = envs
        .iter()
        .map(|e| EnvJson {
            name: &e.name,
            path: e.path.display().to_string(),
            state: env_state(e),
            interpreter: e
                .record
                .as_ref()
                .map(|r| r.interpreter.display().to_string()),
            interpreter_version: e.record.as_ref().map(|r| r.interpreter_version.as_str()),
            dependency_hash: e.record.as_ref().map(|r| r.dependency_hash.as_str()),
            created_at: e.record.as_ref().map(|r| r.created_at.to_rfc3339()),
            last_used: e.last_used.map(|t| t.to_rfc3339()),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json_envs)?);
    Ok(())
}

fn print_env_plain(envs: &[EnvEntry]) {
    for env in envs {
        println!("{}", env.path.display());
    }
}

/// Remove environments unused for a number of days
async fn gc_envs(
    settings: &Settings,
    ctx: &UiContext,
    days_override: Option<u32>,
    dry_run: bool,
) -> InvenvResult<()> {
    let max_age = match days_override {
        Some(0) => None,
        Some(days) => Some(Duration::from_secs(u64::from(days) * 24 * 60 * 60)),
        None => settings.gc_max_age,
    };

    let Some(max_age) = max_age else {
        println!("Environment GC is disabled (gc_days = 0)");
        return Ok(());
    };
    let days = max_age.as_secs() / (24 * 60 * 60);

    let report = settings.coordinator().collect_garbage(max_age, dry_run).await?;

    if report.removed.is_empty() {
        println!("No environments unused for {} days.", days);
    } else {
        println!(
            "{} {} environment(s) unused for {} days:",
            if dry_run { "Found" } else { "Removed" },
            report.removed.len(),
            days
        );
        for path in &report.removed {
            ui::step_remove(ctx, &path.display().to_string());
        }
    }
    print_skipped(ctx, &report);

    if dry_run && !report.removed.is_empty() {
        println!();
        ui::remark(ctx, "Dry run - no environments removed.");
    }

    Ok(())
}

/// Remove every environment not in use
async fn clear_envs(settings: &Settings, ctx: &UiContext) -> InvenvResult<()> {
    let coordinator = settings.coordinator();
    let envs = coordinator.store().list().await?;

    if envs.is_empty() {
        println!("No environments to clear.");
        return Ok(());
    }

    println!(
        "This will remove {} environment(s) from {}:",
        envs.len(),
        settings.cache_root().display()
    );
    for env in &envs {
        ui::step_remove(ctx, &env.name);
    }
    println!();

    if !ui::confirm(ctx, "Are you sure?", false).await? {
        println!("Aborted.");
        return Ok(());
    }

    let report = coordinator.clear().await?;

    ui::step_ok(
        ctx,
        &format!("Cleared {} environment(s)", report.removed.len()),
    );
    print_skipped(ctx, &report);

    Ok(())
}

fn print_skipped(ctx: &UiContext, report: &GcReport) {
    if report.locked > 0 {
        ui::step_warn(ctx, &format!("{} environment(s) locked by a build", report.locked));
    }
    if report.in_use > 0 {
        ui::step_warn(ctx, &format!("{} environment(s) in use", report.in_use));
    }
    if report.failed > 0 {
        ui::step_warn(
            ctx,
            &format!("{} environment(s) could not be removed (see -v)", report.failed),
        );
    }
}
