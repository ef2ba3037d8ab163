// src/types.rs

use std::fmt;

use crate::cli::{StartWorkerArgs, WorkerArgs};
use crate::config::{ConfigFile, LauncherSection};
use crate::errors::{QueuewardenError, Result};
use crate::queue::parse_queue_list;
use crate::worker::{WorkerFamily, WorkerRegistry};

/// Which supervised binary a launch runs. Each start command maps to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchKind {
    /// Multi-queue worker binary; the only kind that receives `COUNT`.
    Worker,
    Single,
    Scheduled,
}

impl LaunchKind {
    pub fn family(self) -> WorkerFamily {
        match self {
            LaunchKind::Worker => WorkerFamily::Base,
            LaunchKind::Single => WorkerFamily::Single,
            LaunchKind::Scheduled => WorkerFamily::Scheduler,
        }
    }

    pub fn binary_name(self, launcher: &LauncherSection) -> &str {
        match self {
            LaunchKind::Worker => &launcher.worker_binary,
            LaunchKind::Single => &launcher.single_binary,
            LaunchKind::Scheduled => &launcher.scheduled_binary,
        }
    }

    pub fn is_multi_worker(self) -> bool {
        matches!(self, LaunchKind::Worker)
    }
}

impl fmt::Display for LaunchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LaunchKind::Worker => "worker",
            LaunchKind::Single => "single",
            LaunchKind::Scheduled => "scheduled",
        };
        f.write_str(name)
    }
}

/// Everything a start command asked for, after CLI parsing.
///
/// `count` and `interval` stay signed so that out-of-range input can be
/// reported by [`WorkerSpec::validate`] rather than by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub queues: Vec<String>,
    pub count: i64,
    pub interval: i64,
    pub blocking: bool,
    pub worker_class: String,
    pub memory_limit_mb: u64,
    pub foreground: bool,
    pub logging_channel: Option<String>,
    pub force: bool,
    /// `-v` occurrences, mirrored to children as VERBOSE / VVERBOSE.
    pub verbosity: u8,
}

impl WorkerSpec {
    pub fn new(queues: Vec<String>, family: WorkerFamily) -> Self {
        Self {
            queues,
            count: 1,
            interval: crate::cli::DEFAULT_INTERVAL,
            blocking: false,
            worker_class: family.default_variant().to_string(),
            memory_limit_mb: 0,
            foreground: false,
            logging_channel: None,
            force: false,
            verbosity: 0,
        }
    }

    pub fn from_worker_args(args: &WorkerArgs, family: WorkerFamily, verbosity: u8) -> Self {
        Self {
            queues: parse_queue_list(&args.queues),
            count: 1,
            interval: args.interval,
            blocking: args.blocking,
            worker_class: args
                .worker
                .clone()
                .unwrap_or_else(|| family.default_variant().to_string()),
            memory_limit_mb: args.memory_limit,
            foreground: args.foreground,
            logging_channel: args.logging.clone(),
            force: args.force,
            verbosity,
        }
    }

    pub fn from_start_worker_args(args: &StartWorkerArgs, verbosity: u8) -> Self {
        Self {
            count: args.count,
            ..Self::from_worker_args(&args.common, WorkerFamily::Base, verbosity)
        }
    }

    /// Comma-joined queue list as handed to children.
    pub fn queue_list(&self) -> String {
        self.queues.join(",")
    }

    /// Check every input invariant; nothing may be spawned when this fails.
    pub fn validate(
        &self,
        config: &ConfigFile,
        registry: &WorkerRegistry,
        family: WorkerFamily,
    ) -> Result<()> {
        if self.count < 1 {
            return Err(QueuewardenError::Validation(
                "Workers count must be higher than 0".to_string(),
            ));
        }
        if self.interval < 1 {
            return Err(QueuewardenError::Validation(
                "Workers interval must be higher than 0".to_string(),
            ));
        }
        if self.queues.is_empty() {
            return Err(QueuewardenError::Validation(
                "At least one queue name is required".to_string(),
            ));
        }
        if let Some(channel) = &self.logging_channel {
            if !config.has_logging_channel(channel) {
                return Err(QueuewardenError::Validation(format!(
                    "Logger {channel} cannot be found"
                )));
            }
        }
        registry.validate(&self.worker_class, family)?;
        Ok(())
    }
}
