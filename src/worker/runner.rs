// src/worker/runner.rs

//! Default polling worker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::errors::Result;
use crate::queue::{resolve_queues, Job, QueueBackend};
use crate::worker::{FailureListener, JobRegistry, WorkOptions, WorkSummary, Worker, WorkerContext};

/// Polls queues in list order and performs the first job found.
///
/// - Non-blocking mode: every queue is tried once per iteration; if all are
///   empty the worker sleeps for `interval`.
/// - Blocking mode: the worker waits on all queues at once for up to
///   `interval`.
///
/// Queue errors are logged and retried after `interval`; they never end the
/// loop. Shutdown is checked between jobs and interrupts the idle sleep, but
/// never a job in progress.
pub struct QueueWorker {
    queue: Arc<dyn QueueBackend>,
    jobs: Arc<JobRegistry>,
    queues: Vec<String>,
    channel: Option<String>,
    listeners: Vec<Arc<dyn FailureListener>>,
}

impl QueueWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self {
            queue: ctx.queue,
            jobs: ctx.jobs,
            queues: Vec::new(),
            channel: None,
            listeners: Vec::new(),
        }
    }

    async fn next_job(&self, interval: Duration, blocking: bool) -> Result<Option<Job>> {
        let queues = resolve_queues(self.queue.as_ref(), &self.queues).await?;

        if blocking {
            return self.queue.blocking_dequeue(&queues, interval).await;
        }

        for name in queues.iter() {
            if let Some(job) = self.queue.dequeue(name).await? {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    /// Perform `job`; returns `false` when it failed.
    async fn process(&self, job: Job) -> bool {
        let span = info_span!(
            "job",
            id = %job.id,
            queue = %job.queue,
            class = %job.class,
        );

        async {
            debug!("performing job");
            match self.jobs.execute(&job.class, &job.args).await {
                Ok(()) => {
                    info!("job done");
                    true
                }
                Err(err) => {
                    error!(error = %err, "job failed");
                    for listener in self.listeners.iter() {
                        listener.on_failure(&err, &job).await;
                    }
                    false
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl Worker for QueueWorker {
    fn set_queues(&mut self, queues: Vec<String>) {
        self.queues = queues;
    }

    fn set_logging_channel(&mut self, channel: Option<String>) {
        self.channel = channel;
    }

    fn subscribe(&mut self, listener: Arc<dyn FailureListener>) {
        self.listeners.push(listener);
    }

    async fn work(
        &mut self,
        interval: Duration,
        blocking: bool,
        options: WorkOptions,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<WorkSummary> {
        let span = info_span!(
            "worker",
            pid = std::process::id(),
            channel = self.channel.as_deref().unwrap_or("default"),
        );

        async {
            info!(queues = ?self.queues, ?interval, blocking, "worker loop started");
            let mut summary = WorkSummary::default();

            loop {
                if stop_requested(&shutdown) {
                    info!(?summary, "shutdown requested; worker loop stopped");
                    break;
                }
                if options
                    .iteration_cap
                    .is_some_and(|cap| summary.iterations >= cap)
                {
                    info!(?summary, "worker loop reached its iteration cap");
                    break;
                }
                summary.iterations += 1;

                match self.next_job(interval, blocking).await {
                    Ok(Some(job)) => {
                        summary.processed += 1;
                        if !self.process(job).await {
                            summary.failed += 1;
                        }
                    }
                    Ok(None) => {
                        if !blocking {
                            idle(interval, &mut shutdown).await;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "polling queues failed; retrying after interval");
                        idle(interval, &mut shutdown).await;
                    }
                }
            }

            Ok(summary)
        }
        .instrument(span)
        .await
    }
}

fn stop_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Sleep for `interval`, waking early when shutdown is requested.
async fn idle(interval: Duration, shutdown: &mut watch::Receiver<bool>) {
    let stop = async {
        // A dropped sender can never request shutdown.
        let closed = shutdown.wait_for(|stop| *stop).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        _ = tokio::time::sleep(interval) => {}
        _ = stop => debug!("idle sleep cut short by shutdown"),
    }
}
