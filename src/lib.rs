// src/lib.rs

pub mod cli;
pub mod clock;
pub mod config;
pub mod console;
pub mod environment;
pub mod errors;
pub mod fs;
pub mod launch;
pub mod logging;
pub mod process;
pub mod queue;
pub mod relay;
pub mod retry;
pub mod supervisor;
pub mod types;
pub mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::cli::{CliArgs, Command};
use crate::config::resolve_config;
use crate::console::Console;
use crate::environment::host_environment;
use crate::errors::Result;
use crate::fs::RealFileSystem;
use crate::process::OsSpawner;
use crate::supervisor::{Supervisor, Surface};
use crate::types::{LaunchKind, WorkerSpec};
use crate::worker::WorkerFamily;

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - config loading
/// - the start request derived from the subcommand
/// - the supervisor with the real spawner and filesystem
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = resolve_config(args.config.as_deref())?;
    let (spec, surface) = start_request(&args);
    debug!(?spec, ?surface, "start request");

    let mut supervisor = Supervisor::new(cfg, Arc::new(OsSpawner::new()), Arc::new(RealFileSystem))
        .with_config_path(args.config.as_ref().map(PathBuf::from))
        .with_console(Console::stdio(args.quiet))
        .with_host_env(host_environment());

    supervisor.run(&spec, surface).await
}

/// Map a parsed command line onto a worker spec and where it runs.
pub fn start_request(args: &CliArgs) -> (WorkerSpec, Surface) {
    match &args.command {
        Command::StartWorker(w) => {
            let spec = WorkerSpec::from_start_worker_args(w, args.verbose);
            let surface = if w.launch {
                Surface::Subprocess(LaunchKind::Worker)
            } else {
                Surface::InProcess
            };
            (spec, surface)
        }
        Command::StartWorkerSingle(w) => (
            WorkerSpec::from_worker_args(w, WorkerFamily::Single, args.verbose),
            Surface::Subprocess(LaunchKind::Single),
        ),
        Command::StartScheduledWorker(w) => (
            WorkerSpec::from_worker_args(w, WorkerFamily::Scheduler, args.verbose),
            Surface::Subprocess(LaunchKind::Scheduled),
        ),
    }
}
