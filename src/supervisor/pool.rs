// src/supervisor/pool.rs

//! Multi-worker pools.
//!
//! `start-worker --count N` with N > 1 re-invokes this binary N times with
//! `--count 1`. Each child runs one in-process worker and shares this
//! process's stdout/stderr.

use std::path::Path;

use crate::environment::Environment;
use crate::process::{CommandLine, OutputMode};
use crate::types::WorkerSpec;

/// Command for one pool member.
pub fn child_command(
    exe: &Path,
    spec: &WorkerSpec,
    config_path: Option<&Path>,
    env: Environment,
) -> CommandLine {
    let mut cmd = CommandLine::new(exe.display().to_string(), env)
        .output(OutputMode::Inherit)
        .arg("start-worker")
        .arg(spec.queue_list())
        .args(["--count".to_string(), "1".to_string()])
        .args(["--interval".to_string(), spec.interval.to_string()])
        .args(["--worker".to_string(), spec.worker_class.clone()]);

    if spec.blocking {
        cmd = cmd.arg("--blocking");
    }
    if let Some(channel) = &spec.logging_channel {
        cmd = cmd.args(["--logging".to_string(), channel.clone()]);
    }
    if let Some(path) = config_path {
        cmd = cmd.args(["--config".to_string(), path.display().to_string()]);
    }
    for _ in 0..spec.verbosity {
        cmd = cmd.arg("-v");
    }
    cmd
}
