// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Raw configuration as read from a TOML file, before validation.
///
/// ```toml
/// [redis]
/// host = "127.0.0.1"
/// port = 6379
/// database = 2
///
/// [queue]
/// prefix = "resque"
///
/// [paths]
/// cache_dir = "var/cache"
/// log_dir = "var/log"
///
/// [launcher]
/// runtime = "php"
/// bin_dir = "vendor/bin"
/// memory_limit_args = ["-d", "memory_limit={mb}M"]
///
/// [launcher.scheduled_env]
/// RESQUE_PHP = "vendor/chrisboulton/php-resque/lib/Resque.php"
///
/// [logging]
/// channels = ["app", "resque"]
///
/// [env]
/// exclude = ["SHELL_SESSION_ID"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub redis: RedisSection,

    #[serde(default)]
    pub queue: QueueSection,

    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub launcher: LauncherSection,

    #[serde(default)]
    pub logging: LoggingSection,

    #[serde(default)]
    pub env: EnvSection,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub redis: RedisSection,
    pub queue: QueueSection,
    pub paths: PathsSection,
    pub launcher: LauncherSection,
    pub logging: LoggingSection,
    pub env: EnvSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            redis: raw.redis,
            queue: raw.queue,
            paths: raw.paths,
            launcher: raw.launcher,
            logging: raw.logging,
            env: raw.env,
        }
    }

    /// `host:port` of the Redis backend, when both are configured.
    pub fn redis_backend(&self) -> Option<String> {
        match (&self.redis.host, self.redis.port) {
            (Some(host), Some(port)) if !host.is_empty() => Some(format!("{host}:{port}")),
            _ => None,
        }
    }

    /// Connection URL for the in-process queue backend.
    pub fn redis_url(&self) -> String {
        let backend = self
            .redis_backend()
            .unwrap_or_else(|| "127.0.0.1:6379".to_string());
        format!("redis://{}/{}", backend, self.redis.database.unwrap_or(0))
    }

    pub fn has_logging_channel(&self, name: &str) -> bool {
        self.logging.channels.iter().any(|c| c == name)
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}

/// `[redis]` section. Host and port are only forwarded when both are set.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RedisSection {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Database index; `0`/absent means the server default and is not
    /// forwarded to children.
    #[serde(default)]
    pub database: Option<u32>,
}

/// `[queue]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSection {
    /// Key namespace shared with the worker binaries (`PREFIX`).
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "resque".to_string()
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    /// Where supervisor PID files and generated worker PID files live.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Where background workers write their combined output.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("var/cache")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("var/log")
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            log_dir: default_log_dir(),
        }
    }
}

/// `[launcher]` section: how a worker binary is turned into a command line.
#[derive(Debug, Clone, Deserialize)]
pub struct LauncherSection {
    /// Optional interpreter the worker binaries run under (e.g. `php`).
    /// When absent the binary is executed directly.
    #[serde(default)]
    pub runtime: Option<String>,

    #[serde(default = "default_bin_dir")]
    pub bin_dir: PathBuf,

    /// Memory-limit directive inserted when `--memory-limit` is non-zero.
    /// `{mb}` is replaced with the limit.
    #[serde(default = "default_memory_limit_args")]
    pub memory_limit_args: Vec<String>,

    #[serde(default = "default_worker_binary")]
    pub worker_binary: String,

    #[serde(default = "default_single_binary")]
    pub single_binary: String,

    #[serde(default = "default_scheduled_binary")]
    pub scheduled_binary: String,

    /// Extra variables handed only to the scheduled worker, e.g. the
    /// `RESQUE_PHP` library path the scheduler binary bootstraps from.
    #[serde(default)]
    pub scheduled_env: BTreeMap<String, String>,
}

fn default_bin_dir() -> PathBuf {
    PathBuf::from("vendor/bin")
}

fn default_memory_limit_args() -> Vec<String> {
    vec!["-d".to_string(), "memory_limit={mb}M".to_string()]
}

fn default_worker_binary() -> String {
    "resque".to_string()
}

fn default_single_binary() -> String {
    "resque-single".to_string()
}

fn default_scheduled_binary() -> String {
    "resque-scheduler".to_string()
}

impl Default for LauncherSection {
    fn default() -> Self {
        Self {
            runtime: None,
            bin_dir: default_bin_dir(),
            memory_limit_args: default_memory_limit_args(),
            worker_binary: default_worker_binary(),
            single_binary: default_single_binary(),
            scheduled_binary: default_scheduled_binary(),
            scheduled_env: BTreeMap::new(),
        }
    }
}

/// `[logging]` section: the registered logging channels a worker may use.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingSection {
    #[serde(default)]
    pub channels: Vec<String>,
}

/// `[env]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EnvSection {
    /// Host variables stripped before the environment is handed to a child,
    /// in addition to queuewarden's own CLI-only variables.
    #[serde(default)]
    pub exclude: Vec<String>,
}
