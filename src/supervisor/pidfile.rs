// src/supervisor/pidfile.rs

//! Supervisor PID files.
//!
//! The file holds the decimal pid of the supervised worker and nothing
//! else. It exists only while that worker is believed to be running.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::errors::{QueuewardenError, Result};
use crate::fs::FileSystem;

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    /// `<cache_dir>/<binary>_<queues>.pid`, one per binary and queue set.
    pub fn for_launch(
        cache_dir: &Path,
        binary: &str,
        queues: &[String],
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let queues = queues
            .iter()
            .map(|q| sanitize(q))
            .collect::<Vec<_>>()
            .join("-");
        Self::new(cache_dir.join(format!("{binary}_{queues}.pid")), fs)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.fs.exists(&self.path)
    }

    pub fn write(&self, pid: u32) -> Result<()> {
        self.fs
            .write(&self.path, pid.to_string().as_bytes())
            .map_err(|e| QueuewardenError::Lifecycle(format!("{e:#}")))?;
        debug!(path = %self.path.display(), pid, "pid file written");
        Ok(())
    }

    /// The recorded pid, or `None` when the file does not exist.
    pub fn read(&self) -> Result<Option<u32>> {
        if !self.exists() {
            return Ok(None);
        }
        let text = self
            .fs
            .read_to_string(&self.path)
            .map_err(|e| QueuewardenError::Lifecycle(format!("{e:#}")))?;
        text.trim().parse::<u32>().map(Some).map_err(|_| {
            QueuewardenError::Lifecycle(format!(
                "PID file {} does not contain a pid: {:?}",
                self.path.display(),
                text.trim()
            ))
        })
    }

    /// Delete the file. Returns `false` when it was already gone.
    pub fn remove(&self) -> Result<bool> {
        let removed = self
            .fs
            .remove_file(&self.path)
            .map_err(|e| QueuewardenError::Lifecycle(format!("{e:#}")))?;
        if removed {
            debug!(path = %self.path.display(), "pid file removed");
        }
        Ok(removed)
    }
}

fn sanitize(queue: &str) -> String {
    queue
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
