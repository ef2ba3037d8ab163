// src/queue/mod.rs

//! Queue broker abstraction.
//!
//! The supervisor never owns queue storage; it only needs the broker's
//! enqueue / enqueue-at / dequeue operations. [`QueueBackend`] captures that
//! surface so the in-process worker and the retry engine can run against
//! Redis in production and against [`InMemoryQueue`] in tests.
//!
//! - [`job`] holds the `Job` / `JobArgs` data model.
//! - [`memory`] is a FIFO-per-queue in-memory broker.
//! - [`redis_store`] speaks the Resque key layout over the `redis` crate.

pub mod job;
pub mod memory;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;

pub use job::{Job, JobArgs, RETRY_ATTEMPT_KEY, RETRY_STRATEGY_KEY};
pub use memory::InMemoryQueue;
pub use redis_store::RedisQueue;

/// Queue list entry that expands to every known queue.
pub const ALL_QUEUES: &str = "*";

#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append `job` to the tail of `job.queue`.
    async fn enqueue(&self, job: Job) -> Result<()>;

    /// Register `job` for execution no earlier than `at`.
    async fn enqueue_at(&self, at: DateTime<Utc>, job: Job) -> Result<()>;

    /// Pop the head of `queue`, if any.
    async fn dequeue(&self, queue: &str) -> Result<Option<Job>>;

    /// Wait up to `timeout` for a job on any of `queues`, honouring their
    /// order as priority.
    async fn blocking_dequeue(&self, queues: &[String], timeout: Duration) -> Result<Option<Job>>;

    /// Every queue the broker knows about, sorted.
    async fn queues(&self) -> Result<Vec<String>>;
}

/// Split a comma-separated queue list, dropping blanks.
pub fn parse_queue_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve the queues to poll this round, expanding [`ALL_QUEUES`].
pub async fn resolve_queues(backend: &dyn QueueBackend, configured: &[String]) -> Result<Vec<String>> {
    if configured.iter().any(|q| q == ALL_QUEUES) {
        backend.queues().await
    } else {
        Ok(configured.to_vec())
    }
}
