// src/retry/mod.rs

//! Failure requeue engine.
//!
//! Subscribed to job failures, the engine reads the job's reserved
//! `retry_strategy` / `retry_attempt` arguments and decides whether to
//! resubmit:
//!
//! - no strategy: nothing happens, the failure stands.
//! - `retry_attempt` past the end of the strategy: retries are exhausted,
//!   nothing happens.
//! - delay `0`: the job goes back on the tail of its queue right away.
//! - delay `d > 0`: the job is scheduled for `now + d`.
//!
//! The resubmitted job carries `retry_attempt + 1`. Broker errors are logged
//! and swallowed; a broken retry policy must never take the worker down.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::errors::{QueuewardenError, Result};
use crate::queue::{Job, QueueBackend, RETRY_ATTEMPT_KEY};
use crate::worker::FailureListener;

/// What the engine did with a failed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The job carries no retry strategy.
    NotRetryable,
    /// Every entry of the strategy has been used.
    Exhausted { attempt: u64 },
    /// Put back on its queue immediately.
    Requeued { attempt: u64 },
    /// Scheduled for a later time.
    Scheduled {
        attempt: u64,
        delay_secs: u64,
        at: DateTime<Utc>,
    },
    /// The retry arguments were malformed or the broker refused the
    /// resubmission. Already logged.
    Failed { reason: String },
}

/// The resubmission the engine intends to make.
#[derive(Debug, Clone, PartialEq)]
enum RetryPlan {
    Skip(RetryOutcome),
    Immediate { attempt: u64, job: Job },
    Delayed { attempt: u64, delay_secs: u64, at: DateTime<Utc>, job: Job },
}

pub struct RetryEngine {
    queue: Arc<dyn QueueBackend>,
    clock: Arc<dyn Clock>,
}

impl RetryEngine {
    pub fn new(queue: Arc<dyn QueueBackend>) -> Self {
        Self {
            queue,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle one failed job. Never returns an error.
    pub async fn handle_failure(&self, error: &anyhow::Error, job: &Job) -> RetryOutcome {
        debug!(queue = %job.queue, class = %job.class, error = %error, "evaluating retry policy");

        let plan = match plan_retry(job, self.clock.now()) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(
                    queue = %job.queue,
                    class = %job.class,
                    error = %err,
                    "job carries malformed retry arguments; not retrying"
                );
                return RetryOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };

        match plan {
            RetryPlan::Skip(outcome) => {
                if let RetryOutcome::Exhausted { attempt } = outcome {
                    debug!(queue = %job.queue, class = %job.class, attempt, "retries exhausted");
                }
                outcome
            }
            RetryPlan::Immediate { attempt, job: next } => {
                match self.queue.enqueue(next).await {
                    Ok(()) => {
                        info!(
                            queue = %job.queue,
                            class = %job.class,
                            attempt,
                            "Job failed. Auto re-queued, attempt number: {attempt}"
                        );
                        RetryOutcome::Requeued { attempt }
                    }
                    Err(err) => self.resubmission_failed(job, err),
                }
            }
            RetryPlan::Delayed {
                attempt,
                delay_secs,
                at,
                job: next,
            } => match self.queue.enqueue_at(at, next).await {
                Ok(()) => {
                    info!(
                        queue = %job.queue,
                        class = %job.class,
                        attempt,
                        delay_secs,
                        "Job failed. Auto re-queued. Scheduled for: {}, attempt number: {attempt}",
                        at.format("%Y-%m-%d %H:%M:%S")
                    );
                    RetryOutcome::Scheduled {
                        attempt,
                        delay_secs,
                        at,
                    }
                }
                Err(err) => self.resubmission_failed(job, err),
            },
        }
    }

    fn resubmission_failed(&self, job: &Job, err: QueuewardenError) -> RetryOutcome {
        warn!(
            queue = %job.queue,
            class = %job.class,
            error = %err,
            "could not resubmit failed job"
        );
        RetryOutcome::Failed {
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl FailureListener for RetryEngine {
    async fn on_failure(&self, error: &anyhow::Error, job: &Job) {
        self.handle_failure(error, job).await;
    }
}

/// Pure decision step: which resubmission (if any) a failed job gets.
///
/// The reported `attempt` is the index into the strategy that was consumed;
/// the resubmitted job's `retry_attempt` is one higher.
fn plan_retry(job: &Job, now: DateTime<Utc>) -> Result<RetryPlan> {
    let Some(strategy) = job.args.retry_strategy()? else {
        return Ok(RetryPlan::Skip(RetryOutcome::NotRetryable));
    };

    let attempt = job.args.retry_attempt()?;
    let Some(&delay_secs) = usize::try_from(attempt)
        .ok()
        .and_then(|idx| strategy.get(idx))
    else {
        return Ok(RetryPlan::Skip(RetryOutcome::Exhausted { attempt }));
    };

    let mut args = job.args.clone();
    args.set(RETRY_ATTEMPT_KEY, attempt + 1);
    let next = job.resubmission(args);

    if delay_secs == 0 {
        return Ok(RetryPlan::Immediate { attempt, job: next });
    }

    let at = i64::try_from(delay_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|delay| now.checked_add_signed(delay))
        .ok_or_else(|| {
            QueuewardenError::Validation(format!("retry delay of {delay_secs}s is out of range"))
        })?;

    Ok(RetryPlan::Delayed {
        attempt,
        delay_secs,
        at,
        job: next,
    })
}
