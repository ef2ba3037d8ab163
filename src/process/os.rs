// src/process/os.rs

//! Real process spawner backed by `tokio::process`.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{CommandLine, OutputLine, OutputMode, OutputStream, ProcessHandle, ProcessSpawner, Signal};
use crate::errors::{QueuewardenError, Result};

/// Output lines buffered per child before readers apply backpressure.
const OUTPUT_BUFFER: usize = 256;

/// Spawner used in production.
#[derive(Debug, Clone, Default)]
pub struct OsSpawner;

impl OsSpawner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessSpawner for OsSpawner {
    fn spawn(
        &self,
        command: &CommandLine,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessHandle>> + Send + '_>> {
        let command = command.clone();
        Box::pin(async move { spawn_child(command) })
    }

    fn signal(
        &self,
        pid: u32,
        signal: Signal,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { send_signal(pid, signal).await })
    }
}

fn spawn_child(command: CommandLine) -> Result<ProcessHandle> {
    info!(cmd = %command, "spawning process");

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .env_clear()
        .envs(command.env.iter())
        .stdin(Stdio::null())
        .kill_on_drop(false);

    match command.output {
        OutputMode::Capture => {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        OutputMode::Inherit => {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning '{}'", command.program))
        .map_err(|e| QueuewardenError::Launch(format!("{e:#}")))?;

    let pid = child
        .id()
        .ok_or_else(|| QueuewardenError::Launch("spawned process has no pid".to_string()))?;

    let (line_tx, line_rx) = mpsc::channel(OUTPUT_BUFFER);
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, OutputStream::Stdout, line_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, OutputStream::Stderr, line_tx.clone());
    }
    drop(line_tx);

    let (exit_tx, exit_rx) = oneshot::channel();
    tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => {
                let code = status.code().unwrap_or(-1);
                info!(pid, exit_code = code, success = status.success(), "process exited");
                code
            }
            Err(err) => {
                warn!(pid, error = %err, "waiting for process failed");
                -1
            }
        };
        let _ = exit_tx.send(code);
    });

    Ok(ProcessHandle {
        pid,
        output: line_rx,
        exit: exit_rx,
    })
}

fn forward_lines<R>(reader: R, stream: OutputStream, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(OutputLine { stream, line }).await.is_err() {
                // Receiver gone; keep draining so the child never blocks.
                continue;
            }
        }
        debug!(?stream, "output stream closed");
    });
}

async fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("taskkill");
        c.arg("/PID").arg(pid.to_string());
        if signal == Signal::Kill || signal == Signal::Terminate {
            c.arg("/F");
        }
        c
    } else {
        let mut c = Command::new("kill");
        c.arg("-s").arg(signal.name()).arg(pid.to_string());
        c
    };

    let output = cmd
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("running kill for pid {pid}"))?;

    if output.status.success() {
        debug!(pid, %signal, "signal delivered");
        Ok(())
    } else {
        Err(QueuewardenError::Lifecycle(format!(
            "could not send {signal} to {pid}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}
