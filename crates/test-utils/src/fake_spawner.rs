use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use queuewarden::errors::{QueuewardenError, Result};
use queuewarden::process::{
    CommandLine, OutputLine, OutputStream, ProcessHandle, ProcessSpawner, Signal,
};

/// How one spawned process behaves.
#[derive(Debug, Clone)]
pub struct ScriptedProcess {
    pid: Option<u32>,
    output: Vec<OutputLine>,
    exit_code: i32,
    until_signalled: bool,
    fail_spawn: bool,
}

impl ScriptedProcess {
    /// Emits its output, then exits with `code`.
    pub fn exits(code: i32) -> Self {
        Self {
            pid: None,
            output: Vec::new(),
            exit_code: code,
            until_signalled: false,
            fail_spawn: false,
        }
    }

    /// Emits its output, then keeps running until it is signalled, at which
    /// point it exits with `code`.
    pub fn until_signalled(code: i32) -> Self {
        Self {
            until_signalled: true,
            ..Self::exits(code)
        }
    }

    /// `spawn` returns a launch error.
    pub fn fails_to_spawn() -> Self {
        Self {
            fail_spawn: true,
            ..Self::exits(0)
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn stdout(mut self, line: &str) -> Self {
        self.output.push(OutputLine {
            stream: OutputStream::Stdout,
            line: line.to_string(),
        });
        self
    }

    pub fn stderr(mut self, line: &str) -> Self {
        self.output.push(OutputLine {
            stream: OutputStream::Stderr,
            line: line.to_string(),
        });
        self
    }
}

#[derive(Default)]
struct State {
    scripts: VecDeque<ScriptedProcess>,
    spawned: Vec<CommandLine>,
    signals: Vec<(u32, Signal)>,
    running: HashMap<u32, (oneshot::Sender<i32>, i32)>,
    next_pid: u32,
}

/// A fake spawner that:
/// - records every command it was asked to run
/// - plays back queued [`ScriptedProcess`]es in order (default: exit 0)
/// - records signals and ends "until signalled" processes on the first one.
#[derive(Clone, Default)]
pub struct FakeSpawner {
    state: Arc<Mutex<State>>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, process: ScriptedProcess) -> &Self {
        self.state.lock().unwrap().scripts.push_back(process);
        self
    }

    pub fn spawned(&self) -> Vec<CommandLine> {
        self.state.lock().unwrap().spawned.clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().unwrap().spawned.len()
    }

    pub fn signals(&self) -> Vec<(u32, Signal)> {
        self.state.lock().unwrap().signals.clone()
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(
        &self,
        command: &CommandLine,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessHandle>> + Send + '_>> {
        let mut state = self.state.lock().unwrap();
        state.spawned.push(command.clone());
        let script = state
            .scripts
            .pop_front()
            .unwrap_or_else(|| ScriptedProcess::exits(0));

        if script.fail_spawn {
            let program = command.program.clone();
            return Box::pin(async move {
                Err::<ProcessHandle, _>(QueuewardenError::Launch(format!(
                    "cannot spawn {program}"
                )))
            });
        }

        state.next_pid += 1;
        let pid = script.pid.unwrap_or(1000 + state.next_pid);

        let (line_tx, line_rx) = mpsc::channel(script.output.len().max(1));
        for line in script.output {
            // Capacity covers every line, so this never fails.
            let _ = line_tx.try_send(line);
        }
        drop(line_tx);

        let (exit_tx, exit_rx) = oneshot::channel();
        if script.until_signalled {
            state.running.insert(pid, (exit_tx, script.exit_code));
        } else {
            let _ = exit_tx.send(script.exit_code);
        }

        Box::pin(async move {
            Ok::<_, QueuewardenError>(ProcessHandle {
                pid,
                output: line_rx,
                exit: exit_rx,
            })
        })
    }

    fn signal(
        &self,
        pid: u32,
        signal: Signal,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let mut state = self.state.lock().unwrap();
        state.signals.push((pid, signal));
        if let Some((exit_tx, code)) = state.running.remove(&pid) {
            let _ = exit_tx.send(code);
        }
        Box::pin(async { Ok::<(), QueuewardenError>(()) })
    }
}
