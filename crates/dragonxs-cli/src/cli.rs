use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "dragonxs - Generate, cache and merge DRAGON multigroup cross sections for many composition units.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render one DRAGON deck per cross-section id, run them and merge the libraries.
    Run(RunArgs),
    /// Inspect or clear the shared output cache.
    Cache(CacheArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    // --- Core Arguments ---
    /// Path to the composition file describing the units (TOML).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path to the main configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Write the per-xs-id neutron velocity summary to this CSV file.
    #[arg(long, value_name = "PATH")]
    pub velocities: Option<PathBuf>,

    // --- Solver Overrides ---
    /// Override the DRAGON executable (a path or a name found on PATH).
    #[arg(short = 'x', long, value_name = "PATH")]
    pub executable: Option<PathBuf>,

    /// Override the DRAGLIB nuclear data library (a file, or a directory holding the default library).
    #[arg(short, long, value_name = "PATH")]
    pub library: Option<PathBuf>,

    /// Override the deck template.
    #[arg(short, long, value_name = "PATH")]
    pub template: Option<PathBuf>,

    // --- Execution Overrides ---
    /// Override the directory receiving decks, outputs and the merged library.
    #[arg(short, long, value_name = "PATH")]
    pub working_dir: Option<PathBuf>,

    /// Number of concurrent DRAGON runs. Defaults to the number of logical cores.
    #[arg(short = 'j', long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Run every case even when a cache is configured, and store nothing.
    #[arg(long)]
    pub no_cache: bool,

    /// Override `execution.failure-policy` from the config file.
    #[command(flatten)]
    pub failure_policy: FailurePolicyFlags,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S execution.workers=4
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Mutually exclusive flags selecting what happens when some cases fail.
#[derive(Args, Debug, Clone, Copy)]
#[group(required = false, multiple = false)]
pub struct FailurePolicyFlags {
    /// Merge the libraries of the cases that succeeded and report the rest.
    #[arg(long)]
    pub partial: bool,
    /// Report every failed case and skip the merge.
    #[arg(long)]
    pub fail_fast: bool,
}

/// Arguments for the `cache` subcommand.
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Print the cache key of an executable and its ordered input files.
    Key {
        #[arg(required = true)]
        executable: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Remove every entry from the output cache.
    Clear {
        /// Root of the cache store.
        #[arg(long, value_name = "PATH", required_unless_present = "config")]
        root: Option<PathBuf>,
        /// Read the cache root from this configuration file.
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}
