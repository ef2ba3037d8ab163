pub mod builders;
pub mod fake_spawner;

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queuewarden::clock::Clock;
use queuewarden::errors::{QueuewardenError, Result};
use queuewarden::queue::{Job, QueueBackend};
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

pub const TEST_DEADLINE: Duration = Duration::from_secs(5);

/// Install a test subscriber once per test binary.
///
/// Output goes through the test writer, so it only shows up for failing
/// tests. `QUEUEWARDEN_TEST_LOG` takes precedence over `RUST_LOG`; the
/// default is `warn,queuewarden=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = std::env::var("QUEUEWARDEN_TEST_LOG")
            .ok()
            .and_then(|spec| EnvFilter::try_new(spec).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("warn,queuewarden=debug"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(false)
            .try_init();
    });
}

/// Fail the test if `f` has not finished within [`TEST_DEADLINE`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    match tokio::time::timeout(TEST_DEADLINE, f).await {
        Ok(value) => value,
        Err(_) => panic!("test did not finish within {TEST_DEADLINE:?}"),
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Broker that refuses every write and has nothing to read.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingQueue;

#[async_trait]
impl QueueBackend for FailingQueue {
    async fn enqueue(&self, job: Job) -> Result<()> {
        Err(QueuewardenError::Queue(format!("broker down; dropped {}", job.id)))
    }

    async fn enqueue_at(&self, _at: DateTime<Utc>, job: Job) -> Result<()> {
        Err(QueuewardenError::Queue(format!("broker down; dropped {}", job.id)))
    }

    async fn dequeue(&self, _queue: &str) -> Result<Option<Job>> {
        Err(QueuewardenError::Queue("broker down".to_string()))
    }

    async fn blocking_dequeue(&self, _queues: &[String], _timeout: Duration) -> Result<Option<Job>> {
        Err(QueuewardenError::Queue("broker down".to_string()))
    }

    async fn queues(&self) -> Result<Vec<String>> {
        Err(QueuewardenError::Queue("broker down".to_string()))
    }
}
