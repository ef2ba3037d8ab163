// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Three related commands share one option shape. Numeric options that
//! carry invariants (`--count`, `--interval`) are parsed as signed integers
//! so that `0` or negative values reach validation and yield exit code 1
//! rather than a clap usage error.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Poll interval used when `--interval` is not given.
pub const DEFAULT_INTERVAL: i64 = 5;

/// Command-line arguments for `queuewarden`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "queuewarden",
    version,
    about = "Start and supervise Resque-style queue workers.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Queuewarden.toml` in the current working directory; built-in
    /// defaults are used when that file does not exist.
    #[arg(long, global = true, value_name = "PATH", env = "QUEUEWARDEN_CONFIG")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `QUEUEWARDEN_LOG`, the verbosity flags, or a default
    /// level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Increase verbosity; mirrored to workers as VERBOSE / VVERBOSE.
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress operator notes (errors are still printed).
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start one or more queue workers.
    StartWorker(StartWorkerArgs),

    /// Start a single-worker binary as a subprocess.
    StartWorkerSingle(WorkerArgs),

    /// Start the scheduled/delayed-queue poller as a subprocess.
    StartScheduledWorker(WorkerArgs),
}

/// Options shared by every start command.
#[derive(Debug, Clone, Args)]
pub struct WorkerArgs {
    /// Queue names (separate using comma).
    pub queues: String,

    /// How often to check for new jobs across the queues (seconds).
    #[arg(short = 'i', long, default_value_t = DEFAULT_INTERVAL, allow_negative_numbers = true)]
    pub interval: i64,

    /// Worker variant name.
    #[arg(short = 'w', long, value_name = "NAME")]
    pub worker: Option<String>,

    /// Block on the queue instead of sleeping between polls.
    #[arg(short = 'b', long)]
    pub blocking: bool,

    /// Run the worker attached to this terminal, streaming its output.
    #[arg(short = 'f', long)]
    pub foreground: bool,

    /// Force the child's memory limit (MB); 0 leaves it untouched.
    #[arg(short = 'm', long = "memory-limit", default_value_t = 0)]
    pub memory_limit: u64,

    /// Registered logging channel handed to the worker.
    #[arg(short = 'l', long, value_name = "CHANNEL")]
    pub logging: Option<String>,

    /// Replace an existing PID file instead of refusing to start.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Args)]
pub struct StartWorkerArgs {
    #[command(flatten)]
    pub common: WorkerArgs,

    /// How many workers to start.
    #[arg(short = 'c', long, default_value_t = 1, allow_negative_numbers = true)]
    pub count: i64,

    /// Launch the worker binary as a subprocess instead of working in-process.
    #[arg(long)]
    pub launch: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
