// src/queue/job.rs

//! The unit of work moved through the queues.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::{QueuewardenError, Result};

/// Reserved argument: ordered delays (seconds), one per retry attempt.
pub const RETRY_STRATEGY_KEY: &str = "retry_strategy";

/// Reserved argument: retries already consumed. Absent means 0.
pub const RETRY_ATTEMPT_KEY: &str = "retry_attempt";

/// String-keyed job arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobArgs(Map<String, Value>);

impl JobArgs {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|v| !v.is_null())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Delays for each retry attempt.
    ///
    /// `Ok(None)` when the job carries no strategy (absent, null or empty
    /// list). Entries must be non-negative integers.
    pub fn retry_strategy(&self) -> Result<Option<Vec<u64>>> {
        let Some(value) = self.0.get(RETRY_STRATEGY_KEY) else {
            return Ok(None);
        };

        let items = match value {
            Value::Null => return Ok(None),
            Value::Array(items) => items,
            other => {
                return Err(QueuewardenError::Validation(format!(
                    "{RETRY_STRATEGY_KEY} must be a list of delays, got {other}"
                )));
            }
        };

        if items.is_empty() {
            return Ok(None);
        }

        items
            .iter()
            .map(|item| {
                item.as_u64().ok_or_else(|| {
                    QueuewardenError::Validation(format!(
                        "{RETRY_STRATEGY_KEY} entries must be non-negative integers, got {item}"
                    ))
                })
            })
            .collect::<Result<Vec<u64>>>()
            .map(Some)
    }

    /// Retries already consumed; defaults to 0 when absent.
    pub fn retry_attempt(&self) -> Result<u64> {
        match self.0.get(RETRY_ATTEMPT_KEY) {
            None | Some(Value::Null) => Ok(0),
            Some(value) => value.as_u64().ok_or_else(|| {
                QueuewardenError::Validation(format!(
                    "{RETRY_ATTEMPT_KEY} must be a non-negative integer, got {value}"
                ))
            }),
        }
    }
}

impl From<Map<String, Value>> for JobArgs {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A queued job: which queue, which payload class, with what arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub queue: String,
    pub class: String,
    #[serde(default)]
    pub args: JobArgs,
}

impl Job {
    pub fn new(queue: impl Into<String>, class: impl Into<String>, args: JobArgs) -> Self {
        Self {
            id: new_job_id(),
            queue: queue.into(),
            class: class.into(),
            args,
        }
    }

    /// A fresh job for the same queue and class with replaced arguments.
    pub fn resubmission(&self, args: JobArgs) -> Self {
        Self::new(self.queue.clone(), self.class.clone(), args)
    }
}

pub(crate) fn new_job_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn absent_or_empty_strategy_is_none() {
        assert_eq!(JobArgs::new().retry_strategy().unwrap(), None);

        let args = JobArgs::new().with(RETRY_STRATEGY_KEY, json!([]));
        assert_eq!(args.retry_strategy().unwrap(), None);

        let args = JobArgs::new().with(RETRY_STRATEGY_KEY, Value::Null);
        assert_eq!(args.retry_strategy().unwrap(), None);
    }

    #[test]
    fn strategy_and_attempt_are_read() {
        let args = JobArgs::new()
            .with(RETRY_STRATEGY_KEY, json!([0, 30, 120]))
            .with(RETRY_ATTEMPT_KEY, 1);

        assert_eq!(args.retry_strategy().unwrap(), Some(vec![0, 30, 120]));
        assert_eq!(args.retry_attempt().unwrap(), 1);
    }

    #[test]
    fn malformed_reserved_keys_are_errors() {
        let args = JobArgs::new().with(RETRY_STRATEGY_KEY, json!([5, "soon"]));
        assert!(args.retry_strategy().is_err());

        let args = JobArgs::new().with(RETRY_ATTEMPT_KEY, -1);
        assert!(args.retry_attempt().is_err());
    }

    #[test]
    fn resubmission_keeps_queue_and_class() {
        let job = Job::new("mail", "SendMail", JobArgs::new().with("to", "a@b.c"));
        let again = job.resubmission(job.args.clone().with(RETRY_ATTEMPT_KEY, 1));

        assert_eq!(again.queue, "mail");
        assert_eq!(again.class, "SendMail");
        assert_ne!(again.id, job.id);
        assert_eq!(again.args.get("to"), Some(&json!("a@b.c")));
    }
}
