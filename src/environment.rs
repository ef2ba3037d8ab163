// src/environment.rs

//! Child environment construction.
//!
//! Workers are configured entirely through environment variables. The
//! builder starts from the supervisor's own environment, drops anything the
//! child must not inherit, then layers the worker keys on top:
//!
//! | key                 | when                                     |
//! |---------------------|------------------------------------------|
//! | `REDIS_BACKEND`     | `[redis]` host and port both set         |
//! | `REDIS_BACKEND_DB`  | `[redis] database` non-zero              |
//! | `PREFIX`            | `[queue] prefix` non-empty               |
//! | `PIDFILE`           | background launches only                 |
//! | `QUEUE`             | always, comma-joined                     |
//! | `WORKER_CLASS`      | always                                   |
//! | `BLOCKING`          | `--blocking` given                       |
//! | `COUNT`             | multi-worker binary only                 |
//! | `INTERVAL`          | always                                   |
//! | `LOG_CHANNEL`       | `--logging` given                        |
//! | `VERBOSE`/`VVERBOSE`| `-v` / `-vv`                             |
//!
//! Scheduled launches also receive `[launcher.scheduled_env]`, applied
//! before the worker keys.
//!
//! The result is an immutable map handed to the spawner. The supervisor's
//! own process environment is never modified.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::debug;
use uuid::Uuid;

use crate::config::ConfigFile;
use crate::errors::Result;
use crate::types::{LaunchKind, WorkerSpec};
use crate::worker::WorkerRegistry;

pub const REDIS_BACKEND: &str = "REDIS_BACKEND";
pub const REDIS_BACKEND_DB: &str = "REDIS_BACKEND_DB";
pub const PREFIX: &str = "PREFIX";
pub const PIDFILE: &str = "PIDFILE";
pub const QUEUE: &str = "QUEUE";
pub const WORKER_CLASS: &str = "WORKER_CLASS";
pub const BLOCKING: &str = "BLOCKING";
pub const COUNT: &str = "COUNT";
pub const INTERVAL: &str = "INTERVAL";
pub const LOG_CHANNEL: &str = "LOG_CHANNEL";
pub const VERBOSE: &str = "VERBOSE";
pub const VVERBOSE: &str = "VVERBOSE";

/// Keys this builder owns. Inherited values for them are always dropped so
/// that a child only sees what this launch decided.
const WORKER_KEYS: &[&str] = &[
    REDIS_BACKEND,
    REDIS_BACKEND_DB,
    PREFIX,
    PIDFILE,
    QUEUE,
    WORKER_CLASS,
    BLOCKING,
    COUNT,
    INTERVAL,
    LOG_CHANNEL,
    VERBOSE,
    VVERBOSE,
];

/// Whether `key` is set by the builder and so cannot come from config.
pub fn is_worker_key(key: &str) -> bool {
    WORKER_KEYS.contains(&key)
}

/// Variables that configure `queuewarden` itself.
const CLI_ONLY_KEYS: &[&str] = &["QUEUEWARDEN_LOG", "QUEUEWARDEN_CONFIG"];

/// Snapshot of the current process environment. Non-UTF-8 entries are
/// skipped.
pub fn host_environment() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Immutable key/value environment for one child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Host environment minus the CLI-only variables, without any worker
    /// keys. Used for re-invocations of `queuewarden` itself.
    pub fn passthrough(config: &ConfigFile, host: &BTreeMap<String, String>) -> Self {
        Self {
            vars: sanitize(config, host),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Path the child was told to write its PID to, if any.
    pub fn pid_file(&self) -> Option<PathBuf> {
        self.get(PIDFILE).map(PathBuf::from)
    }
}

/// Builds [`Environment`]s for a given configuration.
pub struct EnvironmentBuilder<'a> {
    config: &'a ConfigFile,
    registry: &'a WorkerRegistry,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(config: &'a ConfigFile, registry: &'a WorkerRegistry) -> Self {
        Self { config, registry }
    }

    /// Validate `spec` and assemble the child environment for `kind`.
    ///
    /// Fails with a validation error on bad input; nothing is spawned by the
    /// caller in that case.
    pub fn build(
        &self,
        spec: &WorkerSpec,
        kind: LaunchKind,
        host: &BTreeMap<String, String>,
    ) -> Result<Environment> {
        spec.validate(self.config, self.registry, kind.family())?;

        let mut vars = sanitize(self.config, host);
        let mut set = |key: &str, value: String| {
            vars.insert(key.to_string(), value);
        };

        if kind == LaunchKind::Scheduled {
            for (key, value) in self.config.launcher.scheduled_env.iter() {
                set(key.as_str(), value.clone());
            }
        }

        if let Some(backend) = self.config.redis_backend() {
            set(REDIS_BACKEND, backend);
            if let Some(db) = self.config.redis.database.filter(|db| *db != 0) {
                set(REDIS_BACKEND_DB, db.to_string());
            }
        }

        if !self.config.queue.prefix.is_empty() {
            set(PREFIX, self.config.queue.prefix.clone());
        }

        if !spec.foreground {
            let binary = kind.binary_name(&self.config.launcher);
            let path = self
                .config
                .paths
                .cache_dir
                .join(format!("{binary}-{}.pid", Uuid::new_v4().simple()));
            set(PIDFILE, path.display().to_string());
        }

        set(QUEUE, spec.queue_list());
        set(WORKER_CLASS, spec.worker_class.clone());

        if spec.blocking {
            set(BLOCKING, "1".to_string());
        }

        if kind.is_multi_worker() {
            set(COUNT, spec.count.to_string());
        }

        set(INTERVAL, spec.interval.to_string());

        if let Some(channel) = &spec.logging_channel {
            set(LOG_CHANNEL, channel.clone());
        }

        match spec.verbosity {
            0 => {}
            1 => set(VERBOSE, "1".to_string()),
            _ => set(VVERBOSE, "1".to_string()),
        }

        debug!(kind = %kind, keys = vars.len(), "built child environment");
        Ok(Environment { vars })
    }
}

fn sanitize(config: &ConfigFile, host: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    host.iter()
        .filter(|(key, _)| {
            !CLI_ONLY_KEYS.contains(&key.as_str())
                && !WORKER_KEYS.contains(&key.as_str())
                && !config.env.exclude.iter().any(|ex| ex == *key)
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
