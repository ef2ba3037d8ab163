// src/supervisor/mod.rs

//! Worker supervision.
//!
//! The supervisor validates a start request and then takes one of four
//! paths:
//!
//! - in-process: build a worker from the registry and run its loop here.
//! - pool: `count > 1` in-process, re-invoke this binary once per worker.
//! - background: detach the worker binary and record its pid.
//! - foreground: run the worker binary attached, stream its output and
//!   relay termination signals to it.
//!
//! Lifecycle: `Idle -> Launching -> Running(mode) -> Terminated`. A request
//! that fails validation goes straight from `Idle` to `Terminated` without
//! spawning anything.

mod pidfile;
pub mod pool;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ConfigFile;
use crate::console::Console;
use crate::environment::{Environment, EnvironmentBuilder};
use crate::errors::{QueuewardenError, Result};
use crate::fs::FileSystem;
use crate::launch::build_command;
use crate::process::{CommandLine, OutputStream, ProcessHandle, ProcessSpawner, Signal};
use crate::queue::{QueueBackend, RedisQueue};
use crate::relay::{listen_for_signals, SignalRelay};
use crate::retry::RetryEngine;
use crate::types::{LaunchKind, WorkerSpec};
use crate::worker::{JobRegistry, WorkOptions, WorkerContext, WorkerFamily, WorkerRegistry};

pub use pidfile::PidFile;

/// How long to keep reading a foreground child's output after it exited.
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

/// Where a validated request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// `start-worker` without `--launch`.
    InProcess,
    /// An external worker binary.
    Subprocess(LaunchKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    InProcess,
    Pool,
    Foreground,
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Launching,
    Running(RunMode),
    Terminated,
}

pub struct Supervisor {
    config: ConfigFile,
    config_path: Option<PathBuf>,
    workers: WorkerRegistry,
    jobs: Arc<JobRegistry>,
    spawner: Arc<dyn ProcessSpawner>,
    fs: Arc<dyn FileSystem>,
    console: Console,
    clock: Arc<dyn Clock>,
    host_env: BTreeMap<String, String>,
    queue: Option<Arc<dyn QueueBackend>>,
    signals: Option<mpsc::Receiver<Signal>>,
    self_exe: Option<PathBuf>,
    work_options: WorkOptions,
    history: Vec<SupervisorState>,
}

impl Supervisor {
    pub fn new(
        config: ConfigFile,
        spawner: Arc<dyn ProcessSpawner>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            config,
            config_path: None,
            workers: WorkerRegistry::with_defaults(),
            jobs: Arc::new(JobRegistry::new()),
            spawner,
            fs,
            console: Console::stdio(false),
            clock: Arc::new(SystemClock),
            host_env: BTreeMap::new(),
            queue: None,
            signals: None,
            self_exe: None,
            work_options: WorkOptions::default(),
            history: vec![SupervisorState::Idle],
        }
    }

    /// Config file forwarded to pool members.
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn with_worker_registry(mut self, workers: WorkerRegistry) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_job_registry(mut self, jobs: JobRegistry) -> Self {
        self.jobs = Arc::new(jobs);
        self
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Environment children inherit from. Defaults to empty.
    pub fn with_host_env(mut self, host_env: BTreeMap<String, String>) -> Self {
        self.host_env = host_env;
        self
    }

    /// Queue used by in-process workers instead of connecting to Redis.
    pub fn with_queue(mut self, queue: Arc<dyn QueueBackend>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Signal source used instead of installing OS handlers.
    pub fn with_signals(mut self, signals: mpsc::Receiver<Signal>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Executable re-invoked for pool members. Defaults to the current one.
    pub fn with_self_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.self_exe = Some(exe.into());
        self
    }

    pub fn with_work_options(mut self, options: WorkOptions) -> Self {
        self.work_options = options;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.history
            .last()
            .copied()
            .unwrap_or(SupervisorState::Idle)
    }

    /// Every state passed through, oldest first.
    pub fn history(&self) -> &[SupervisorState] {
        &self.history
    }

    /// Run one start request to completion and return the exit code.
    ///
    /// Validation failures (including a PID file collision) are reported on
    /// the console and yield `1`. Spawn and lifecycle failures are returned
    /// as errors.
    pub async fn run(&mut self, spec: &WorkerSpec, surface: Surface) -> Result<i32> {
        let result = match surface {
            Surface::InProcess => self.run_in_process(spec).await,
            Surface::Subprocess(kind) => self.launch(spec, kind).await,
        };
        self.transition(SupervisorState::Terminated);

        match result {
            Err(QueuewardenError::Validation(msg)) => {
                self.console.error(&msg);
                Ok(1)
            }
            other => other,
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        debug!(from = ?self.state(), to = ?next, "supervisor state change");
        self.history.push(next);
    }

    fn take_signals(&mut self) -> Result<mpsc::Receiver<Signal>> {
        match self.signals.take() {
            Some(rx) => Ok(rx),
            None => listen_for_signals().map_err(|e| {
                QueuewardenError::Lifecycle(format!("installing signal handlers: {e}"))
            }),
        }
    }

    async fn run_in_process(&mut self, spec: &WorkerSpec) -> Result<i32> {
        spec.validate(&self.config, &self.workers, WorkerFamily::Base)?;
        // Popping jobs nobody here can perform would fail every one of them.
        if self.jobs.is_empty() {
            return Err(QueuewardenError::Validation(
                "No job classes are registered in this process; use --launch to run an external worker"
                    .to_string(),
            ));
        }
        self.transition(SupervisorState::Launching);

        if spec.count > 1 {
            return self.run_pool(spec).await;
        }

        let queue: Arc<dyn QueueBackend> = match &self.queue {
            Some(queue) => queue.clone(),
            None => Arc::new(RedisQueue::new(
                &self.config.redis_url(),
                &self.config.queue.prefix,
            )?),
        };

        let prefix = &self.config.queue.prefix;
        if !prefix.is_empty() {
            self.console.comment(format!("Prefix set to {prefix}"));
        }

        let ctx = WorkerContext {
            queue: queue.clone(),
            jobs: self.jobs.clone(),
        };
        let mut worker = self
            .workers
            .create(&spec.worker_class, WorkerFamily::Base, ctx)?;
        worker.set_queues(spec.queues.clone());
        worker.set_logging_channel(spec.logging_channel.clone());
        worker.subscribe(Arc::new(
            RetryEngine::new(queue).with_clock(self.clock.clone()),
        ));

        let mut signals = self.take_signals()?;
        self.console
            .note(format!("Starting worker {}", spec.queue_list()));
        self.transition(SupervisorState::Running(RunMode::InProcess));

        let interval = Duration::from_secs(spec.interval.unsigned_abs());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut work = worker.work(interval, spec.blocking, self.work_options, shutdown_rx);
        let mut signals_open = true;
        let mut stopping = false;

        loop {
            tokio::select! {
                summary = &mut work => {
                    let summary = summary?;
                    info!(?summary, "in-process worker finished");
                    return Ok(0);
                }
                received = signals.recv(), if signals_open => match received {
                    Some(signal) if !stopping => {
                        info!(%signal, "stopping in-process worker after the current job");
                        self.console
                            .comment(format!("{signal} received, finishing the current job"));
                        stopping = true;
                        let _ = shutdown_tx.send(true);
                    }
                    Some(signal) => {
                        warn!(%signal, "repeated signal; abandoning the current job");
                        self.console.note("Worker stopped before its job finished");
                        return Ok(1);
                    }
                    None => signals_open = false,
                },
            }
        }
    }

    async fn run_pool(&mut self, spec: &WorkerSpec) -> Result<i32> {
        let exe = match &self.self_exe {
            Some(exe) => exe.clone(),
            None => std::env::current_exe()
                .map_err(|e| QueuewardenError::Launch(format!("locating own executable: {e}")))?,
        };
        let env = Environment::passthrough(&self.config, &self.host_env);

        let mut pids = Vec::new();
        for i in 0..spec.count {
            let cmd = pool::child_command(&exe, spec, self.config_path.as_deref(), env.clone());
            match self.spawner.spawn(&cmd).await {
                Ok(handle) => {
                    self.console
                        .comment(format!("Starting worker {i} (pid {})", handle.pid));
                    pids.push(handle.pid);
                }
                Err(err) => {
                    warn!(worker = i, error = %err, "spawning pool member failed");
                    self.console.note(format!("Could not fork worker {i}"));
                }
            }
        }

        info!(?pids, requested = spec.count, "worker pool started");
        self.transition(SupervisorState::Running(RunMode::Pool));
        Ok(0)
    }

    async fn launch(&mut self, spec: &WorkerSpec, kind: LaunchKind) -> Result<i32> {
        let env = EnvironmentBuilder::new(&self.config, &self.workers).build(
            spec,
            kind,
            &self.host_env,
        )?;
        let command = build_command(&self.config, spec, kind, env);
        let pid_file = PidFile::for_launch(
            &self.config.paths.cache_dir,
            kind.binary_name(&self.config.launcher),
            &spec.queues,
            self.fs.clone(),
        );

        if pid_file.exists() {
            if !spec.force {
                return Err(QueuewardenError::Validation(format!(
                    "PID file {} exists - use --force to override",
                    pid_file.path().display()
                )));
            }
            warn!(path = %pid_file.path().display(), "replacing existing PID file");
            pid_file.remove()?;
        }

        self.console.note(format!("Starting worker {command}"));
        self.transition(SupervisorState::Launching);

        if spec.foreground {
            self.run_foreground(&command, &pid_file).await
        } else {
            self.run_background(spec, &command, &pid_file).await
        }
    }

    async fn run_background(
        &mut self,
        spec: &WorkerSpec,
        command: &CommandLine,
        pid_file: &PidFile,
    ) -> Result<i32> {
        let mut handle = self.spawner.spawn(command).await?;
        self.transition(SupervisorState::Running(RunMode::Background));

        let mut reported = Vec::new();
        while let Some(line) = handle.output.recv().await {
            match line.stream {
                OutputStream::Stdout => reported.push(line.line),
                OutputStream::Stderr => warn!(line = %line.line, "launcher stderr"),
            }
        }
        let code = (&mut handle.exit).await.unwrap_or(-1);
        if code != 0 {
            return Err(QueuewardenError::Launch(format!(
                "launcher exited with status {code}"
            )));
        }

        let pid = parse_reported_pid(&reported)?;
        pid_file.write(pid)?;

        info!(pid, log_file = ?command.log_file, "background worker started");
        self.console.text(format!(
            "Worker started {}:{}:{}",
            hostname(),
            pid,
            spec.queue_list()
        ));
        Ok(0)
    }

    async fn run_foreground(&mut self, command: &CommandLine, pid_file: &PidFile) -> Result<i32> {
        // Handlers go in before the child exists so no signal slips past.
        let mut signals = self.take_signals()?;
        let mut handle = self.spawner.spawn(command).await?;

        if let Err(err) = pid_file.write(handle.pid) {
            warn!(pid = handle.pid, "PID file not written; stopping worker");
            let _ = self.spawner.signal(handle.pid, Signal::Terminate).await;
            return Err(err);
        }

        let relay = SignalRelay::new(pid_file.clone(), self.spawner.clone());
        self.transition(SupervisorState::Running(RunMode::Foreground));

        let code = self.stream_until_exit(&mut handle, &mut signals, &relay).await;

        if pid_file.exists() {
            pid_file.remove()?;
        }
        info!(pid = handle.pid, exit_code = code, "foreground worker exited");
        Ok(if code < 0 { 1 } else { code })
    }

    async fn stream_until_exit(
        &self,
        handle: &mut ProcessHandle,
        signals: &mut mpsc::Receiver<Signal>,
        relay: &SignalRelay,
    ) -> i32 {
        let pid = handle.pid;
        let mut signals_open = true;

        let code = loop {
            tokio::select! {
                Some(line) = handle.output.recv() => self.console.worker_output(&line),
                received = signals.recv(), if signals_open => match received {
                    Some(signal) => {
                        let outcome = relay.relay(signal, pid).await;
                        debug!(?outcome, "signal relay finished");
                    }
                    None => signals_open = false,
                },
                code = &mut handle.exit => break code.unwrap_or(-1),
            }
        };

        let drain = async {
            while let Some(line) = handle.output.recv().await {
                self.console.worker_output(&line);
            }
        };
        if tokio::time::timeout(OUTPUT_DRAIN, drain).await.is_err() {
            debug!(pid, "worker output still open after exit; stopped reading");
        }
        code
    }
}

fn parse_reported_pid(lines: &[String]) -> Result<u32> {
    let last = lines
        .iter()
        .rev()
        .map(|l| l.trim())
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    last.parse::<u32>().map_err(|_| {
        QueuewardenError::Launch(format!("launcher did not report a pid (got {last:?})"))
    })
}

/// Host name for operator messages.
pub fn hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    std::fs::read_to_string(Path::new("/etc/hostname"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
