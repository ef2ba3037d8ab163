// src/logging.rs

//! Logging setup for `queuewarden` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `QUEUEWARDEN_LOG` environment variable (e.g. "info", "debug")
//! 3. `-v` / `-vv` verbosity flags
//! 4. default to `info`
//!
//! Logs are sent to STDERR so that stdout can carry the foreground worker's
//! streamed output.

use anyhow::Result;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>, verbosity: u8) -> Result<()> {
    let level = resolve_level(
        cli_level,
        std::env::var("QUEUEWARDEN_LOG").ok().as_deref(),
        verbosity,
    );

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn resolve_level(cli_level: Option<LogLevel>, env_level: Option<&str>, verbosity: u8) -> tracing::Level {
    if let Some(lvl) = cli_level {
        return level_from_log_level(lvl);
    }
    if let Some(lvl) = env_level.and_then(parse_level_str) {
        return lvl;
    }
    match verbosity {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flag_wins_over_env_and_verbosity() {
        let lvl = resolve_level(Some(LogLevel::Warn), Some("trace"), 2);
        assert_eq!(lvl, tracing::Level::WARN);
    }

    #[test]
    fn env_wins_over_verbosity() {
        assert_eq!(resolve_level(None, Some(" Debug "), 0), tracing::Level::DEBUG);
        assert_eq!(resolve_level(None, Some("bogus"), 1), tracing::Level::DEBUG);
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(resolve_level(None, None, 0), tracing::Level::INFO);
        assert_eq!(resolve_level(None, None, 1), tracing::Level::DEBUG);
        assert_eq!(resolve_level(None, None, 3), tracing::Level::TRACE);
    }
}
