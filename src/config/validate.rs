// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::environment::is_worker_key;
use crate::errors::{QueuewardenError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::QueuewardenError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_redis(cfg)?;
    validate_launcher(cfg)?;
    validate_logging(cfg)?;
    Ok(())
}

fn validate_redis(cfg: &RawConfigFile) -> Result<()> {
    if cfg.redis.port == Some(0) {
        return Err(QueuewardenError::ConfigError(
            "[redis].port must be >= 1 (got 0)".to_string(),
        ));
    }
    if let Some(host) = &cfg.redis.host {
        if host.trim().is_empty() {
            return Err(QueuewardenError::ConfigError(
                "[redis].host must not be empty when set".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_launcher(cfg: &RawConfigFile) -> Result<()> {
    let launcher = &cfg.launcher;
    for (key, value) in [
        ("worker_binary", &launcher.worker_binary),
        ("single_binary", &launcher.single_binary),
        ("scheduled_binary", &launcher.scheduled_binary),
    ] {
        if value.trim().is_empty() {
            return Err(QueuewardenError::ConfigError(format!(
                "[launcher].{key} must not be empty"
            )));
        }
    }

    if !launcher.memory_limit_args.is_empty()
        && !launcher.memory_limit_args.iter().any(|a| a.contains("{mb}"))
    {
        return Err(QueuewardenError::ConfigError(
            "[launcher].memory_limit_args must contain a `{mb}` placeholder".to_string(),
        ));
    }

    for key in launcher.scheduled_env.keys() {
        if key.trim().is_empty() || key.contains('=') {
            return Err(QueuewardenError::ConfigError(format!(
                "[launcher.scheduled_env] has an invalid variable name {key:?}"
            )));
        }
        if is_worker_key(key) {
            return Err(QueuewardenError::ConfigError(format!(
                "[launcher.scheduled_env] cannot set {key}; it is set per launch"
            )));
        }
    }

    Ok(())
}

fn validate_logging(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for channel in cfg.logging.channels.iter() {
        if channel.trim().is_empty() {
            return Err(QueuewardenError::ConfigError(
                "[logging].channels must not contain empty names".to_string(),
            ));
        }
        if !seen.insert(channel.as_str()) {
            return Err(QueuewardenError::ConfigError(format!(
                "logging channel '{channel}' is registered twice"
            )));
        }
    }
    Ok(())
}
