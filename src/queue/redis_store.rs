// src/queue/redis_store.rs

//! Resque-compatible queue storage on Redis.
//!
//! Key layout (with `prefix = "resque"`):
//! - `resque:queues` set of known queue names
//! - `resque:queue:<name>` list of JSON payloads (RPUSH / LPOP / BLPOP)
//! - `resque:delayed_queue_schedule` zset of timestamps (score = member)
//! - `resque:delayed:<ts>` list of payloads due at `<ts>`
//!
//! These names are the contract with the external worker binaries, which
//! read the same keys.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::Client as RedisClient;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::errors::Result;
use crate::queue::job::new_job_id;
use crate::queue::{Job, JobArgs, QueueBackend};

/// Wire payload. Resque wraps the argument map in a one-element list.
#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    class: String,
    #[serde(default)]
    args: Vec<JobArgs>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    queue: Option<String>,
}

impl Payload {
    fn from_job(job: &Job, with_queue: bool) -> Self {
        Self {
            class: job.class.clone(),
            args: vec![job.args.clone()],
            id: Some(job.id.clone()),
            queue: with_queue.then(|| job.queue.clone()),
        }
    }

    fn into_job(self, queue: &str) -> Job {
        Job {
            id: self.id.unwrap_or_else(new_job_id),
            queue: self.queue.unwrap_or_else(|| queue.to_string()),
            class: self.class,
            args: self.args.into_iter().next().unwrap_or_default(),
        }
    }
}

/// Redis-backed queue speaking the Resque key layout.
///
/// One multiplexed connection is opened on first use and shared by every
/// call afterwards.
pub struct RedisQueue {
    client: RedisClient,
    conn: OnceCell<MultiplexedConnection>,
    prefix: String,
}

impl RedisQueue {
    pub fn new(redis_url: &str, prefix: &str) -> Result<Self> {
        let client = RedisClient::open(redis_url)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            prefix: prefix.trim_end_matches(':').to_string(),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                debug!("opening redis connection");
                self.client.get_multiplexed_async_connection().await
            })
            .await?;
        Ok(conn.clone())
    }

    // Redis key helpers
    fn queues_key(&self) -> String {
        format!("{}:queues", self.prefix)
    }

    fn queue_key(&self, queue: &str) -> String {
        format!("{}:queue:{}", self.prefix, queue)
    }

    fn schedule_key(&self) -> String {
        format!("{}:delayed_queue_schedule", self.prefix)
    }

    fn delayed_key(&self, timestamp: i64) -> String {
        format!("{}:delayed:{}", self.prefix, timestamp)
    }

    fn queue_from_key<'a>(&self, key: &'a str) -> &'a str {
        let marker = format!("{}:queue:", self.prefix);
        key.strip_prefix(marker.as_str()).unwrap_or(key)
    }
}

#[async_trait]
impl QueueBackend for RedisQueue {
    async fn enqueue(&self, job: Job) -> Result<()> {
        let mut con = self.connection().await?;
        let payload = serde_json::to_string(&Payload::from_job(&job, false))?;

        redis::cmd("SADD")
            .arg(self.queues_key())
            .arg(&job.queue)
            .query_async::<_, ()>(&mut con)
            .await?;
        redis::cmd("RPUSH")
            .arg(self.queue_key(&job.queue))
            .arg(payload)
            .query_async::<_, ()>(&mut con)
            .await?;

        debug!(queue = %job.queue, class = %job.class, id = %job.id, "job enqueued");
        Ok(())
    }

    async fn enqueue_at(&self, at: DateTime<Utc>, job: Job) -> Result<()> {
        let mut con = self.connection().await?;
        let timestamp = at.timestamp();
        let payload = serde_json::to_string(&Payload::from_job(&job, true))?;

        redis::cmd("RPUSH")
            .arg(self.delayed_key(timestamp))
            .arg(payload)
            .query_async::<_, ()>(&mut con)
            .await?;
        redis::cmd("ZADD")
            .arg(self.schedule_key())
            .arg(timestamp)
            .arg(timestamp)
            .query_async::<_, ()>(&mut con)
            .await?;

        debug!(queue = %job.queue, class = %job.class, at = timestamp, "job scheduled");
        Ok(())
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<Job>> {
        let mut con = self.connection().await?;
        let raw: Option<String> = redis::cmd("LPOP")
            .arg(self.queue_key(queue))
            .query_async(&mut con)
            .await?;

        match raw {
            Some(json) => {
                let payload: Payload = serde_json::from_str(&json)?;
                Ok(Some(payload.into_job(queue)))
            }
            None => Ok(None),
        }
    }

    async fn blocking_dequeue(&self, queues: &[String], timeout: Duration) -> Result<Option<Job>> {
        if queues.is_empty() {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        }

        let mut con = self.connection().await?;
        let keys: Vec<String> = queues.iter().map(|q| self.queue_key(q)).collect();
        let reply: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(keys)
            .arg(timeout.as_secs().max(1))
            .query_async(&mut con)
            .await?;

        match reply {
            Some((key, json)) => {
                let payload: Payload = serde_json::from_str(&json)?;
                Ok(Some(payload.into_job(self.queue_from_key(&key))))
            }
            None => Ok(None),
        }
    }

    async fn queues(&self) -> Result<Vec<String>> {
        let mut con = self.connection().await?;
        let mut names: Vec<String> = redis::cmd("SMEMBERS")
            .arg(self.queues_key())
            .query_async(&mut con)
            .await?;
        names.sort();
        Ok(names)
    }
}
