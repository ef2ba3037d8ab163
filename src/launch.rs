// src/launch.rs

//! Turn a worker launch into a concrete command line.
//!
//! The worker binary lives under `[launcher].bin_dir`. When a runtime is
//! configured it runs as `runtime [directive] binary`, otherwise the binary
//! is executed directly with the directive after it. The memory directive
//! is only present for a non-zero `--memory-limit`.
//!
//! Background launches are wrapped in `sh -c` so the worker detaches with
//! `nohup`, writes to `<log_dir>/<binary>.log`, and the wrapper prints the
//! detached pid on its stdout.

use std::path::Path;

use crate::config::ConfigFile;
use crate::environment::Environment;
use crate::process::{shell_quote, CommandLine};
use crate::types::{LaunchKind, WorkerSpec};

/// Placeholder replaced by the memory limit in `[launcher].memory_limit_args`.
pub const MEMORY_PLACEHOLDER: &str = "{mb}";

/// Build the command that starts `kind` for `spec` with `env`.
pub fn build_command(
    config: &ConfigFile,
    spec: &WorkerSpec,
    kind: LaunchKind,
    env: Environment,
) -> CommandLine {
    let argv = worker_argv(config, spec, kind);

    if spec.foreground {
        let mut parts = argv.into_iter();
        let program = parts.next().unwrap_or_default();
        return CommandLine::new(program, env).args(parts);
    }

    let binary = kind.binary_name(&config.launcher);
    let log_file = config.paths.log_dir.join(format!("{binary}.log"));
    let script = detach_script(&argv, &log_file);

    let mut cmd = CommandLine::new("sh", env).args(["-c".to_string(), script]);
    cmd.log_file = Some(log_file);
    cmd
}

/// The worker's own argv, before any detaching wrapper.
pub fn worker_argv(config: &ConfigFile, spec: &WorkerSpec, kind: LaunchKind) -> Vec<String> {
    let launcher = &config.launcher;
    let binary = launcher
        .bin_dir
        .join(kind.binary_name(launcher))
        .display()
        .to_string();

    let directive: Vec<String> = if spec.memory_limit_mb == 0 {
        Vec::new()
    } else {
        let mb = spec.memory_limit_mb.to_string();
        launcher
            .memory_limit_args
            .iter()
            .map(|arg| arg.replace(MEMORY_PLACEHOLDER, &mb))
            .collect()
    };

    match &launcher.runtime {
        Some(runtime) => std::iter::once(runtime.clone())
            .chain(directive)
            .chain(std::iter::once(binary))
            .collect(),
        None => std::iter::once(binary).chain(directive).collect(),
    }
}

fn detach_script(argv: &[String], log_file: &Path) -> String {
    let command = argv
        .iter()
        .map(|part| shell_quote(part))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "nohup {command} > {} 2>&1 & echo $!",
        shell_quote(&log_file.display().to_string())
    )
}
