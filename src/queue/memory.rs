// src/queue/memory.rs

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::errors::Result;
use crate::queue::{Job, QueueBackend};

#[derive(Debug, Default)]
struct State {
    queues: BTreeMap<String, VecDeque<Job>>,
    /// Kept sorted by time; equal times keep insertion order.
    scheduled: Vec<(DateTime<Utc>, Job)>,
}

/// In-memory broker with FIFO queues and a time-ordered schedule.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueue {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test thread panicked mid-push.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the jobs waiting on `queue`, head first.
    pub fn pending(&self, queue: &str) -> Vec<Job> {
        self.lock()
            .queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of scheduled jobs, earliest first.
    pub fn scheduled(&self) -> Vec<(DateTime<Utc>, Job)> {
        self.lock().scheduled.clone()
    }

    /// Move every scheduled job due at `now` onto its queue tail.
    pub fn promote_due(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.lock();
        let split = state.scheduled.partition_point(|(at, _)| *at <= now);
        let due: Vec<_> = state.scheduled.drain(..split).collect();
        let moved = due.len();
        for (_, job) in due {
            state.queues.entry(job.queue.clone()).or_default().push_back(job);
        }
        drop(state);
        if moved > 0 {
            self.notify.notify_waiters();
        }
        moved
    }

    fn pop_first(&self, queues: &[String]) -> Option<Job> {
        let mut state = self.lock();
        queues
            .iter()
            .find_map(|name| state.queues.get_mut(name).and_then(VecDeque::pop_front))
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueue {
    async fn enqueue(&self, job: Job) -> Result<()> {
        self.lock()
            .queues
            .entry(job.queue.clone())
            .or_default()
            .push_back(job);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn enqueue_at(&self, at: DateTime<Utc>, job: Job) -> Result<()> {
        let mut state = self.lock();
        let idx = state.scheduled.partition_point(|(t, _)| *t <= at);
        state.scheduled.insert(idx, (at, job));
        Ok(())
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<Job>> {
        Ok(self.pop_first(&[queue.to_string()]))
    }

    async fn blocking_dequeue(&self, queues: &[String], timeout: Duration) -> Result<Option<Job>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(job) = self.pop_first(queues) {
                return Ok(Some(job));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.pop_first(queues));
            }
        }
    }

    async fn queues(&self) -> Result<Vec<String>> {
        Ok(self.lock().queues.keys().cloned().collect())
    }
}
