//! CLI argument definitions using clap derive

use crate::error::{InvenvError, InvenvResult};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// invenv - run Python scripts in cached virtual environments
///
/// Creates a virtual environment for a script, installs its requirements,
/// and reuses the environment on later runs as long as the requirements and
/// the interpreter stay the same.
#[derive(Parser, Debug)]
#[command(name = "invenv")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug with tool output)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Hide progress output
    #[arg(short, long, global = true)]
    pub silent: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "INVENV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding cached environments
    #[arg(long, global = true, env = "INVENV_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a script in its environment
    #[command(after_help = "Examples:\n  \
        invenv run -- somepath/myscript.py\n  \
        invenv run -n -- somepath/myscript.py --version\n  \
        invenv run -r req.txt -- DEBUG=1 somepath/myscript.py")]
    Run(RunArgs),

    /// Print the environment directory of a script, creating it if needed
    Which(WhichArgs),

    /// Create or update a .venv in the current directory
    Init(InitArgs),

    /// Manage cached environments
    Cache(CacheArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Options that select an environment
#[derive(Args, Debug, Clone, Default)]
pub struct EnvArgs {
    /// Python interpreter to use (default: python3)
    #[arg(short, long)]
    pub python: Option<String>,

    /// Requirements file. If not given, the first existing of
    /// requirements_<script>.txt, <script>_requirements.txt and
    /// requirements.txt next to the script is used
    #[arg(short, long)]
    pub requirements_file: Option<PathBuf>,

    /// Recreate the environment even if it is up to date
    #[arg(short, long)]
    pub new_environment: bool,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub env: EnvArgs,

    /// [VAR=val ...] script.py [script args ...]
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "SCRIPT"
    )]
    pub invocation: Vec<String>,
}

/// Arguments for the which command
#[derive(Parser, Debug)]
pub struct WhichArgs {
    #[command(flatten)]
    pub env: EnvArgs,

    /// Python script
    pub script: PathBuf,
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub env: EnvArgs,

    /// Environment directory
    #[arg(long, default_value = ".venv")]
    pub dir: PathBuf,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for list command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached environments
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove environments not used recently
    Gc {
        /// Remove environments unused for N days (default: from config)
        #[arg(long)]
        days: Option<u32>,

        /// Dry run - show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove all environments that are not in use
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// A script invocation: `[VAR=val ...] script [args ...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Variables added to the script's environment
    pub env: Vec<(String, String)>,
    pub script: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    /// Split raw arguments. Leading `KEY=VALUE` words are environment
    /// variables; the first other word is the script.
    pub fn parse(raw: &[String]) -> InvenvResult<Self> {
        let mut env = vec![];
        let mut rest = raw.iter();

        let script = loop {
            match rest.next() {
                Some(word) if word.contains('=') => {
                    env.push(parse_env_var(word).map_err(InvenvError::User)?)
                }
                Some(word) => break PathBuf::from(word),
                None => return Err(InvenvError::User("no script name provided".to_string())),
            }
        };

        Ok(Self {
            env,
            script,
            args: rest.cloned().collect(),
        })
    }
}

/// Parse environment variable in KEY=VALUE format
fn parse_env_var(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE format: no '=' found in '{s}'"))?;
    if pos == 0 {
        return Err(format!("invalid KEY=VALUE format: empty name in '{s}'"));
    }
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}
