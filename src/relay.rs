// src/relay.rs

//! Forwarding of termination signals to a foreground worker.
//!
//! A listener task turns SIGINT / SIGTERM / SIGQUIT into [`Signal`] values
//! on a channel; the supervisor hands each one to [`SignalRelay::relay`].
//! Relaying reads the PID file, signals both the spawned process and the
//! recorded pid, then removes the file. A second signal after a successful
//! forward escalates to SIGKILL.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::process::{ProcessSpawner, Signal};
use crate::supervisor::PidFile;

/// What a relay attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// `signal` was sent to every pid in `pids` and the PID file removed.
    Forwarded { signal: Signal, pids: Vec<u32> },
    /// A repeated signal; SIGKILL was sent to the previously signalled pids.
    Escalated { pids: Vec<u32> },
    /// No PID file, so nothing was signalled.
    MissingPidFile,
    /// The PID file could not be read or parsed. Nothing was signalled.
    Unreadable { reason: String },
}

#[derive(Debug, Default)]
struct RelayState {
    forwarded: Vec<u32>,
}

pub struct SignalRelay {
    pid_file: PidFile,
    spawner: Arc<dyn ProcessSpawner>,
    state: Mutex<RelayState>,
}

impl SignalRelay {
    pub fn new(pid_file: PidFile, spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self {
            pid_file,
            spawner,
            state: Mutex::new(RelayState::default()),
        }
    }

    /// Forward `signal` for the child spawned as `child_pid`.
    ///
    /// Concurrent calls are serialised; each one completes its
    /// read-signal-remove sequence before the next starts.
    pub async fn relay(&self, signal: Signal, child_pid: u32) -> RelayOutcome {
        let mut state = self.state.lock().await;

        if !state.forwarded.is_empty() {
            let pids = state.forwarded.clone();
            warn!(?pids, %signal, "repeated signal; escalating to SIGKILL");
            self.send_all(&pids, Signal::Kill).await;
            return RelayOutcome::Escalated { pids };
        }

        let recorded = match self.pid_file.read() {
            Ok(Some(pid)) => pid,
            Ok(None) => {
                error!(
                    path = %self.pid_file.path().display(),
                    %signal,
                    "PID file not found; signal not relayed"
                );
                return RelayOutcome::MissingPidFile;
            }
            Err(err) => {
                error!(
                    path = %self.pid_file.path().display(),
                    error = %err,
                    "PID file unreadable; signal not relayed"
                );
                return RelayOutcome::Unreadable {
                    reason: err.to_string(),
                };
            }
        };

        let mut pids = vec![child_pid];
        if recorded != child_pid {
            pids.push(recorded);
        }

        info!(?pids, %signal, "relaying signal to worker");
        self.send_all(&pids, signal).await;

        if let Err(err) = self.pid_file.remove() {
            warn!(error = %err, "could not remove PID file after relaying signal");
        }

        state.forwarded = pids.clone();
        RelayOutcome::Forwarded { signal, pids }
    }

    async fn send_all(&self, pids: &[u32], signal: Signal) {
        for pid in pids.iter().copied() {
            if let Err(err) = self.spawner.signal(pid, signal).await {
                warn!(pid, %signal, error = %err, "signal delivery failed");
            }
        }
    }
}

/// Install handlers for SIGINT, SIGTERM and SIGQUIT and stream them.
///
/// Handlers are registered before this returns, so signals arriving between
/// installation and the first `recv` are not lost.
#[cfg(unix)]
pub fn listen_for_signals() -> std::io::Result<mpsc::Receiver<Signal>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = interrupt.recv() => Signal::Interrupt,
                Some(()) = terminate.recv() => Signal::Terminate,
                Some(()) = quit.recv() => Signal::Quit,
                else => break,
            };
            info!(signal = %received, "termination signal received");
            if tx.send(received).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

#[cfg(not(unix))]
pub fn listen_for_signals() -> std::io::Result<mpsc::Receiver<Signal>> {
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            if tx.send(Signal::Interrupt).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}
