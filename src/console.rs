// src/console.rs

//! Operator-facing output.
//!
//! Notes, comments and plain text go to stdout and are silenced by
//! `--quiet`. Errors always go to stderr. Streamed worker output is written
//! verbatim to the stream it came from.

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::process::{OutputLine, OutputStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Note,
    Comment,
    Text,
    Error,
    WorkerStdout,
    WorkerStderr,
}

/// One rendered line, as recorded by a capturing console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub style: Style,
    pub text: String,
}

#[derive(Debug, Clone)]
enum Sink {
    Std,
    Captured(Arc<Mutex<Vec<ConsoleLine>>>),
}

#[derive(Debug, Clone)]
pub struct Console {
    sink: Sink,
    quiet: bool,
}

impl Console {
    pub fn stdio(quiet: bool) -> Self {
        Self {
            sink: Sink::Std,
            quiet,
        }
    }

    /// Console that records lines instead of printing them.
    pub fn captured() -> Self {
        Self {
            sink: Sink::Captured(Arc::default()),
            quiet: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn note(&self, msg: impl AsRef<str>) {
        self.emit(Style::Note, format!(" ! [NOTE] {}", msg.as_ref()));
    }

    pub fn comment(&self, msg: impl AsRef<str>) {
        self.emit(Style::Comment, format!(" // {}", msg.as_ref()));
    }

    pub fn text(&self, msg: impl AsRef<str>) {
        self.emit(Style::Text, msg.as_ref().to_string());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.emit(Style::Error, format!(" [ERROR] {}", msg.as_ref()));
    }

    pub fn worker_output(&self, line: &OutputLine) {
        let style = match line.stream {
            OutputStream::Stdout => Style::WorkerStdout,
            OutputStream::Stderr => Style::WorkerStderr,
        };
        self.emit(style, line.line.clone());
    }

    /// Everything recorded so far; empty for a stdio console.
    pub fn lines(&self) -> Vec<ConsoleLine> {
        match &self.sink {
            Sink::Std => Vec::new(),
            Sink::Captured(lines) => lines.lock().map(|l| l.clone()).unwrap_or_default(),
        }
    }

    /// Recorded text of lines with `style`.
    pub fn texts(&self, style: Style) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.style == style)
            .map(|l| l.text)
            .collect()
    }

    fn emit(&self, style: Style, text: String) {
        let silenced = matches!(style, Style::Note | Style::Comment | Style::Text);
        if self.quiet && silenced {
            return;
        }

        match &self.sink {
            Sink::Std => {
                let result = match style {
                    Style::Error | Style::WorkerStderr => writeln!(std::io::stderr(), "{text}"),
                    _ => writeln!(std::io::stdout(), "{text}"),
                };
                // Broken pipes are ignored.
                let _ = result;
            }
            Sink::Captured(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(ConsoleLine { style, text });
                }
            }
        }
    }
}
