// src/process/mod.rs

//! Process spawning and signalling abstraction.
//!
//! The supervisor talks to a `ProcessSpawner` instead of `tokio::process`
//! directly, so tests can substitute a fake that records what would have run
//! and scripts output, exit codes and pids.
//!
//! - [`OsSpawner`] is the production implementation.
//! - `queuewarden-test-utils` provides `FakeSpawner`.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};

use crate::environment::Environment;
use crate::errors::Result;

mod os;

pub use os::OsSpawner;

/// Signals the supervisor can deliver to a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Interrupt,
    Terminate,
    Quit,
    Kill,
}

impl Signal {
    /// Name as accepted by `kill -s`.
    pub fn name(self) -> &'static str {
        match self {
            Signal::Interrupt => "INT",
            Signal::Terminate => "TERM",
            Signal::Quit => "QUIT",
            Signal::Kill => "KILL",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{}", self.name())
    }
}

/// What to do with a child's stdout/stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Read both streams line by line into the handle.
    Capture,
    /// Share this process's stdout/stderr.
    Inherit,
}

/// A fully resolved command ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    /// Complete child environment; nothing else is inherited.
    pub env: Environment,
    pub output: OutputMode,
    /// Where a detached child writes its output, when it was detached.
    pub log_file: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>, env: Environment) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env,
            output: OutputMode::Capture,
            log_file: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, mode: OutputMode) -> Self {
        self.output = mode;
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_quote(&self.program))?;
        for arg in self.args.iter() {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// Quote `value` for a POSIX shell. Plain words pass through untouched.
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of child output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

/// A running child.
///
/// `output` closes once both streams reach EOF; `exit` resolves with the
/// exit code (`-1` when the child was killed by a signal).
#[derive(Debug)]
pub struct ProcessHandle {
    pub pid: u32,
    pub output: mpsc::Receiver<OutputLine>,
    pub exit: oneshot::Receiver<i32>,
}

/// Trait abstracting how child processes are spawned and signalled.
pub trait ProcessSpawner: Send + Sync {
    /// Start `command` and return as soon as it is running.
    fn spawn(
        &self,
        command: &CommandLine,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessHandle>> + Send + '_>>;

    /// Deliver `signal` to `pid`.
    fn signal(
        &self,
        pid: u32,
        signal: Signal,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_leaves_plain_words_alone() {
        assert_eq!(shell_quote("vendor/bin/resque"), "vendor/bin/resque");
        assert_eq!(shell_quote("memory_limit=512M"), "memory_limit=512M");
        assert_eq!(shell_quote("has space"), "'has space'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn display_joins_quoted_parts() {
        let cmd = CommandLine::new("php", Environment::default())
            .args(["-d", "memory_limit=64M", "bin/my worker"]);
        assert_eq!(cmd.to_string(), "php -d memory_limit=64M 'bin/my worker'");
        assert_eq!(Signal::Terminate.to_string(), "SIGTERM");
    }
}
