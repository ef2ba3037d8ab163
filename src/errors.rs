// src/errors.rs

//! Crate-wide error type and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueuewardenError {
    /// Bad count/interval/worker class/logging channel, or a PID file
    /// collision. Raised before any process is spawned.
    #[error("{0}")]
    Validation(String),

    /// A fork/spawn attempt failed.
    #[error("Launch error: {0}")]
    Launch(String),

    /// PID file bookkeeping or signal delivery went wrong.
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QueuewardenError {
    /// Exit code reported by the CLI for this error.
    ///
    /// Every failure surfaces as `1`; success paths return `0` without
    /// going through here.
    pub fn exit_code(&self) -> i32 {
        1
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, QueuewardenError::Validation(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, QueuewardenError>;
