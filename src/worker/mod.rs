// src/worker/mod.rs

//! In-process workers.
//!
//! A worker polls an ordered list of queues and performs the jobs it pops.
//! Job failures are published to every subscribed [`FailureListener`]; the
//! retry engine is one such listener.
//!
//! - [`handler`] defines the job capability set and the class registry.
//! - [`registry`] is the closed set of worker variants, keyed by name.
//! - [`runner`] implements the default polling worker.

pub mod handler;
pub mod registry;
pub mod runner;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::errors::Result;
use crate::queue::{Job, QueueBackend};

pub use handler::{perform, JobHandler, JobRegistry};
pub use registry::{WorkerFamily, WorkerRegistry, WorkerVariant};
pub use runner::QueueWorker;

/// Subscriber notified whenever a job fails.
#[async_trait]
pub trait FailureListener: Send + Sync {
    async fn on_failure(&self, error: &anyhow::Error, job: &Job);
}

/// Knobs for [`Worker::work`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkOptions {
    /// Stop after this many poll iterations. `None` runs forever.
    pub iteration_cap: Option<u64>,
}

/// What a bounded `work` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkSummary {
    pub iterations: u64,
    pub processed: u64,
    pub failed: u64,
}

/// Shared collaborators handed to worker factories.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<dyn QueueBackend>,
    pub jobs: Arc<JobRegistry>,
}

/// Capability set of a worker variant.
#[async_trait]
pub trait Worker: Send {
    fn set_queues(&mut self, queues: Vec<String>);

    fn set_logging_channel(&mut self, channel: Option<String>);

    fn subscribe(&mut self, listener: Arc<dyn FailureListener>);

    /// Poll the queues every `interval` (or block on them when `blocking`).
    ///
    /// Returns once `options.iteration_cap` is reached or `shutdown` turns
    /// `true`. A job that was already popped is always performed to the end
    /// before the loop stops; no new job is taken after shutdown.
    async fn work(
        &mut self,
        interval: Duration,
        blocking: bool,
        options: WorkOptions,
        shutdown: watch::Receiver<bool>,
    ) -> Result<WorkSummary>;
}
