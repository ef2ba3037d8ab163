#![allow(dead_code)]

use std::path::PathBuf;

use queuewarden::config::{ConfigFile, RawConfigFile};
use queuewarden::queue::parse_queue_list;
use queuewarden::types::WorkerSpec;
use queuewarden::worker::WorkerFamily;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_redis(mut self, host: &str, port: u16) -> Self {
        self.config.redis.host = Some(host.to_string());
        self.config.redis.port = Some(port);
        self
    }

    pub fn with_database(mut self, db: u32) -> Self {
        self.config.redis.database = Some(db);
        self
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.config.queue.prefix = prefix.to_string();
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.paths.cache_dir = dir.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.paths.log_dir = dir.into();
        self
    }

    pub fn with_runtime(mut self, runtime: &str) -> Self {
        self.config.launcher.runtime = Some(runtime.to_string());
        self
    }

    pub fn with_channel(mut self, channel: &str) -> Self {
        self.config.logging.channels.push(channel.to_string());
        self
    }

    pub fn excluding_env(mut self, key: &str) -> Self {
        self.config.env.exclude.push(key.to_string());
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("test config must be valid")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `WorkerSpec`.
pub struct WorkerSpecBuilder {
    spec: WorkerSpec,
}

impl WorkerSpecBuilder {
    pub fn new(queues: &str, family: WorkerFamily) -> Self {
        Self {
            spec: WorkerSpec::new(parse_queue_list(queues), family),
        }
    }

    pub fn count(mut self, count: i64) -> Self {
        self.spec.count = count;
        self
    }

    pub fn interval(mut self, interval: i64) -> Self {
        self.spec.interval = interval;
        self
    }

    pub fn worker(mut self, name: &str) -> Self {
        self.spec.worker_class = name.to_string();
        self
    }

    pub fn blocking(mut self) -> Self {
        self.spec.blocking = true;
        self
    }

    pub fn foreground(mut self) -> Self {
        self.spec.foreground = true;
        self
    }

    pub fn force(mut self) -> Self {
        self.spec.force = true;
        self
    }

    pub fn memory_limit(mut self, mb: u64) -> Self {
        self.spec.memory_limit_mb = mb;
        self
    }

    pub fn logging(mut self, channel: &str) -> Self {
        self.spec.logging_channel = Some(channel.to_string());
        self
    }

    pub fn verbosity(mut self, level: u8) -> Self {
        self.spec.verbosity = level;
        self
    }

    pub fn build(self) -> WorkerSpec {
        self.spec
    }
}
