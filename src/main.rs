//! invenv - run Python scripts in cached virtual environments
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use invenv::cli::{Cli, Commands};
use invenv::config::ConfigManager;
use invenv::error::InvenvResult;
use invenv::settings::{Overrides, Settings};
use invenv::ui::UiContext;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> InvenvResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("invenv=warn"),
        1 => EnvFilter::new("invenv=info"),
        _ => EnvFilter::new("invenv=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    debug!("Using config {}", config_manager.path().display());
    let config = config_manager.load().await?;

    let settings = Settings::resolve(
        &config,
        &Overrides {
            cache_dir: cli.cache_dir.clone(),
            silent: cli.silent,
            verbosity: cli.verbose,
        },
    );
    debug!("Cache root: {}", settings.cache_root().display());

    let ctx = UiContext::detect()
        .with_silent(settings.silent)
        .with_verbosity(settings.verbosity);

    // Dispatch to command
    match cli.command {
        Commands::Run(args) => invenv::cli::commands::run(args, &settings, &ctx).await,
        Commands::Which(args) => invenv::cli::commands::which(args, &settings, &ctx).await,
        Commands::Init(args) => invenv::cli::commands::init(args, &settings, &ctx).await,
        Commands::Cache(args) => invenv::cli::commands::cache(args, &settings, &ctx).await,
        Commands::Config(args) => {
            invenv::cli::commands::config(args, &config_manager, &config, &ctx).await
        }
    }
}
