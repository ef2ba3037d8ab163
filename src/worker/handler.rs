// src/worker/handler.rs

//! Job handlers: the user-supplied units of work a worker performs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::queue::JobArgs;

/// Capability set every job class implements.
///
/// `set_up` and `tear_down` default to no-ops.
#[async_trait]
pub trait JobHandler: Send {
    async fn run(&mut self, args: &JobArgs) -> Result<()>;

    async fn set_up(&mut self, _args: &JobArgs) -> Result<()> {
        Ok(())
    }

    async fn tear_down(&mut self, _args: &JobArgs) -> Result<()> {
        Ok(())
    }
}

/// Run a handler through its full lifecycle.
///
/// `tear_down` runs whenever `set_up` succeeded; an error from `run` wins
/// over one from `tear_down`.
pub async fn perform(handler: &mut dyn JobHandler, args: &JobArgs) -> Result<()> {
    handler.set_up(args).await?;
    let outcome = handler.run(args).await;
    let teardown = handler.tear_down(args).await;
    outcome.and(teardown)
}

type HandlerFactory = Arc<dyn Fn() -> Box<dyn JobHandler> + Send + Sync>;

/// Job class name → handler factory.
#[derive(Clone, Default)]
pub struct JobRegistry {
    handlers: HashMap<String, HandlerFactory>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("classes", &self.class_names())
            .finish()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, class: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn JobHandler> + Send + Sync + 'static,
    {
        self.handlers.insert(class.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, class: &str) -> bool {
        self.handlers.contains_key(class)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a fresh handler for `class` and perform it with `args`.
    pub async fn execute(&self, class: &str, args: &JobArgs) -> Result<()> {
        let factory = self
            .handlers
            .get(class)
            .ok_or_else(|| anyhow!("job class '{class}' is not registered"))?;
        let mut handler = factory();
        perform(handler.as_mut(), args).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Recording {
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl JobHandler for Recording {
        async fn set_up(&mut self, _args: &JobArgs) -> Result<()> {
            self.log.lock().unwrap().push("set_up");
            Ok(())
        }

        async fn run(&mut self, _args: &JobArgs) -> Result<()> {
            self.log.lock().unwrap().push("run");
            if self.fail {
                return Err(anyhow!("boom"));
            }
            Ok(())
        }

        async fn tear_down(&mut self, _args: &JobArgs) -> Result<()> {
            self.log.lock().unwrap().push("tear_down");
            Ok(())
        }
    }

    #[tokio::test]
    async fn lifecycle_runs_in_order_even_on_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = JobRegistry::new();
        let l = Arc::clone(&log);
        registry.register("Failing", move || {
            Box::new(Recording { log: Arc::clone(&l), fail: true })
        });

        let err = registry.execute("Failing", &JobArgs::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(*log.lock().unwrap(), vec!["set_up", "run", "tear_down"]);
    }

    #[tokio::test]
    async fn unknown_class_fails() {
        let registry = JobRegistry::new();
        let err = registry.execute("Nope", &JobArgs::new()).await.unwrap_err();
        assert!(err.to_string().contains("not registered"));
    }
}
