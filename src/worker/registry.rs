// src/worker/registry.rs

//! Closed set of worker variants.
//!
//! Each start command accepts only variants of its own family. Names are
//! checked when the command's input is validated, before anything spawns.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{QueuewardenError, Result};
use crate::worker::{QueueWorker, Worker, WorkerContext};

/// Which start command a variant belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerFamily {
    /// Multi-queue worker (`start-worker`).
    Base,
    /// Single-worker binary (`start-worker-single`).
    Single,
    /// Delayed-queue poller (`start-scheduled-worker`).
    Scheduler,
}

impl WorkerFamily {
    /// Name of the variant registered for this family out of the box.
    pub fn default_variant(self) -> &'static str {
        match self {
            WorkerFamily::Base => "base",
            WorkerFamily::Single => "single",
            WorkerFamily::Scheduler => "scheduler",
        }
    }
}

impl fmt::Display for WorkerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_variant())
    }
}

type WorkerFactory = Arc<dyn Fn(WorkerContext) -> Box<dyn Worker> + Send + Sync>;

/// A registered worker variant.
#[derive(Clone)]
pub struct WorkerVariant {
    pub name: String,
    pub family: WorkerFamily,
    /// Present when the variant can run inside this process; variants that
    /// only exist as external binaries carry `None`.
    factory: Option<WorkerFactory>,
}

impl fmt::Debug for WorkerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerVariant")
            .field("name", &self.name)
            .field("family", &self.family)
            .field("in_process", &self.factory.is_some())
            .finish()
    }
}

impl WorkerVariant {
    pub fn runs_in_process(&self) -> bool {
        self.factory.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    variants: BTreeMap<String, WorkerVariant>,
}

impl WorkerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three built-in variants.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register_in_process(WorkerFamily::Base.default_variant(), WorkerFamily::Base, |ctx| {
                Box::new(QueueWorker::new(ctx))
            })
            .register_external(WorkerFamily::Single.default_variant(), WorkerFamily::Single)
            .register_external(WorkerFamily::Scheduler.default_variant(), WorkerFamily::Scheduler);
        registry
    }

    /// Register a variant that can be constructed in this process.
    pub fn register_in_process<F>(
        &mut self,
        name: impl Into<String>,
        family: WorkerFamily,
        factory: F,
    ) -> &mut Self
    where
        F: Fn(WorkerContext) -> Box<dyn Worker> + Send + Sync + 'static,
    {
        let name = name.into();
        self.variants.insert(
            name.clone(),
            WorkerVariant {
                name,
                family,
                factory: Some(Arc::new(factory)),
            },
        );
        self
    }

    /// Register a variant implemented by an external worker binary.
    pub fn register_external(&mut self, name: impl Into<String>, family: WorkerFamily) -> &mut Self {
        let name = name.into();
        self.variants.insert(
            name.clone(),
            WorkerVariant {
                name,
                family,
                factory: None,
            },
        );
        self
    }

    /// Check that `name` is a registered variant of `family`.
    pub fn validate(&self, name: &str, family: WorkerFamily) -> Result<&WorkerVariant> {
        match self.variants.get(name) {
            Some(variant) if variant.family == family => Ok(variant),
            _ => Err(QueuewardenError::Validation(format!(
                "Worker class {name} is not of the right kind"
            ))),
        }
    }

    /// Construct an in-process worker for `name`.
    pub fn create(&self, name: &str, family: WorkerFamily, ctx: WorkerContext) -> Result<Box<dyn Worker>> {
        let variant = self.validate(name, family)?;
        match &variant.factory {
            Some(factory) => Ok(factory(ctx)),
            None => Err(QueuewardenError::Validation(format!(
                "Worker class {name} cannot run in-process"
            ))),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }
}
