mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use common::{Harness, TestResult};
use serde_json::json;

use queuewarden::console::Style;
use queuewarden::process::{OutputMode, Signal};
use queuewarden::queue::{InMemoryQueue, Job, JobArgs, QueueBackend, RETRY_STRATEGY_KEY};
use queuewarden::supervisor::{RunMode, Surface, SupervisorState};
use queuewarden::worker::{JobHandler, JobRegistry, WorkOptions, WorkerFamily};
use queuewarden_test_utils::builders::{ConfigFileBuilder, WorkerSpecBuilder};
use queuewarden_test_utils::fake_spawner::ScriptedProcess;

struct Counted {
    runs: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl JobHandler for Counted {
    async fn run(&mut self, _args: &JobArgs) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(anyhow!("smtp timeout"))
        } else {
            Ok(())
        }
    }
}

fn jobs(flaky_runs: &Arc<AtomicUsize>, report_runs: &Arc<AtomicUsize>) -> JobRegistry {
    let mut jobs = JobRegistry::new();
    let flaky = flaky_runs.clone();
    jobs.register("SendMail", move || {
        Box::new(Counted {
            runs: flaky.clone(),
            fail: true,
        })
    });
    let report = report_runs.clone();
    jobs.register("BuildReport", move || {
        Box::new(Counted {
            runs: report.clone(),
            fail: false,
        })
    });
    jobs
}

#[tokio::test(start_paused = true)]
async fn single_worker_polls_in_priority_order_and_requeues_failures() -> TestResult {
    let mut h = Harness::new();
    let queue = InMemoryQueue::new();
    queue
        .enqueue(Job::new("low", "BuildReport", JobArgs::new()))
        .await?;
    queue
        .enqueue(Job::new(
            "high",
            "SendMail",
            JobArgs::new().with(RETRY_STRATEGY_KEY, json!([0])),
        ))
        .await?;

    let flaky_runs = Arc::new(AtomicUsize::new(0));
    let report_runs = Arc::new(AtomicUsize::new(0));

    let mut supervisor = h
        .supervisor(ConfigFileBuilder::new().build())
        .with_queue(Arc::new(queue.clone()))
        .with_job_registry(jobs(&flaky_runs, &report_runs))
        .with_work_options(WorkOptions {
            iteration_cap: Some(4),
        });
    let spec = WorkerSpecBuilder::new("high,low", WorkerFamily::Base)
        .count(1)
        .interval(5)
        .build();

    let code = supervisor.run(&spec, Surface::InProcess).await?;

    assert_eq!(code, 0);
    assert_eq!(h.spawner.spawn_count(), 0);
    // First run fails and is requeued once; the retry also fails and the
    // one-entry strategy is then exhausted.
    assert_eq!(flaky_runs.load(Ordering::SeqCst), 2);
    assert_eq!(report_runs.load(Ordering::SeqCst), 1);
    assert!(queue.pending("high").is_empty());
    assert!(queue.pending("low").is_empty());
    assert!(queue.scheduled().is_empty());

    assert_eq!(h.console.texts(Style::Comment), vec![" // Prefix set to resque"]);
    assert_eq!(
        supervisor.history(),
        &[
            SupervisorState::Idle,
            SupervisorState::Launching,
            SupervisorState::Running(RunMode::InProcess),
            SupervisorState::Terminated,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn count_above_one_starts_a_pool_of_single_workers() -> TestResult {
    let mut h = Harness::new();
    h.spawner
        .script(ScriptedProcess::exits(0).with_pid(11))
        .script(ScriptedProcess::fails_to_spawn())
        .script(ScriptedProcess::exits(0).with_pid(13));
    let runs = Arc::new(AtomicUsize::new(0));
    let mut supervisor = h
        .supervisor(ConfigFileBuilder::new().build())
        .with_job_registry(jobs(&runs, &runs));
    let spec = WorkerSpecBuilder::new("high,low", WorkerFamily::Base)
        .count(3)
        .interval(2)
        .build();

    let code = supervisor.run(&spec, Surface::InProcess).await?;

    assert_eq!(code, 0);
    let spawned = h.spawner.spawned();
    assert_eq!(spawned.len(), 3);
    for cmd in spawned.iter() {
        assert_eq!(cmd.program, "/opt/queuewarden/bin/queuewarden");
        assert_eq!(&cmd.args[..4], &["start-worker", "high,low", "--count", "1"]);
        assert_eq!(cmd.output, OutputMode::Inherit);
        assert!(!cmd.env.contains("QUEUE"));
        assert!(!cmd.env.contains("QUEUEWARDEN_LOG"));
    }
    assert_eq!(h.console.texts(Style::Note), vec![" ! [NOTE] Could not fork worker 1"]);
    assert_eq!(
        supervisor.history()[2],
        SupervisorState::Running(RunMode::Pool)
    );
    Ok(())
}

#[tokio::test]
async fn external_only_variant_cannot_run_in_process() -> TestResult {
    let mut h = Harness::new();
    let mut registry = queuewarden::worker::WorkerRegistry::with_defaults();
    registry.register_external("php-base", WorkerFamily::Base);

    let runs = Arc::new(AtomicUsize::new(0));
    let mut supervisor = h
        .supervisor(ConfigFileBuilder::new().build())
        .with_worker_registry(registry)
        .with_job_registry(jobs(&runs, &runs))
        .with_queue(Arc::new(InMemoryQueue::new()));
    let spec = WorkerSpecBuilder::new("default", WorkerFamily::Base)
        .worker("php-base")
        .build();

    let code = supervisor.run(&spec, Surface::InProcess).await?;

    assert_eq!(code, 1);
    assert_eq!(
        h.console.texts(Style::Error),
        vec![" [ERROR] Worker class php-base cannot run in-process"]
    );
    Ok(())
}

struct Slow {
    finished: Arc<AtomicUsize>,
}

#[async_trait]
impl JobHandler for Slow {
    async fn run(&mut self, _args: &JobArgs) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn slow_jobs(finished: &Arc<AtomicUsize>) -> JobRegistry {
    let mut jobs = JobRegistry::new();
    let finished = finished.clone();
    jobs.register("Export", move || {
        Box::new(Slow {
            finished: finished.clone(),
        })
    });
    jobs
}

async fn two_exports() -> Result<InMemoryQueue, Box<dyn std::error::Error>> {
    let queue = InMemoryQueue::new();
    queue.enqueue(Job::new("exports", "Export", JobArgs::new())).await?;
    queue.enqueue(Job::new("exports", "Export", JobArgs::new())).await?;
    Ok(queue)
}

#[tokio::test(start_paused = true)]
async fn termination_signal_lets_the_running_job_finish() -> TestResult {
    let mut h = Harness::new();
    let queue = two_exports().await?;
    let finished = Arc::new(AtomicUsize::new(0));

    let mut supervisor = h
        .supervisor(ConfigFileBuilder::new().build())
        .with_queue(Arc::new(queue.clone()))
        .with_job_registry(slow_jobs(&finished));
    let spec = WorkerSpecBuilder::new("exports", WorkerFamily::Base).build();

    let tx = h.signals_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(Signal::Terminate).await
    });

    let code = supervisor.run(&spec, Surface::InProcess).await?;

    assert_eq!(code, 0);
    // The first export ran to completion; the second was never taken.
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(queue.pending("exports").len(), 1);
    assert_eq!(
        h.console.texts(Style::Comment),
        vec![
            " // Prefix set to resque",
            " // SIGTERM received, finishing the current job"
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn repeated_signal_abandons_the_running_job() -> TestResult {
    let mut h = Harness::new();
    let queue = two_exports().await?;
    let finished = Arc::new(AtomicUsize::new(0));

    let mut supervisor = h
        .supervisor(ConfigFileBuilder::new().build())
        .with_queue(Arc::new(queue.clone()))
        .with_job_registry(slow_jobs(&finished));
    let spec = WorkerSpecBuilder::new("exports", WorkerFamily::Base).build();

    let tx = h.signals_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(Signal::Interrupt).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(Signal::Interrupt).await
    });

    let code = supervisor.run(&spec, Surface::InProcess).await?;

    assert_eq!(code, 1);
    assert_eq!(finished.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.console.texts(Style::Note).last().map(String::as_str),
        Some(" ! [NOTE] Worker stopped before its job finished")
    );
    Ok(())
}

#[tokio::test]
async fn in_process_worker_without_job_classes_takes_nothing() -> TestResult {
    let mut h = Harness::new();
    let queue = InMemoryQueue::new();
    queue.enqueue(Job::new("mail", "SendMail", JobArgs::new())).await?;

    let mut supervisor = h
        .supervisor(ConfigFileBuilder::new().build())
        .with_queue(Arc::new(queue.clone()));
    let spec = WorkerSpecBuilder::new("mail", WorkerFamily::Base).build();

    let code = supervisor.run(&spec, Surface::InProcess).await?;

    assert_eq!(code, 1);
    assert_eq!(queue.pending("mail").len(), 1);
    let errors = h.console.texts(Style::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("use --launch"), "{}", errors[0]);
    assert_eq!(h.spawner.spawn_count(), 0);
    assert_eq!(
        supervisor.history(),
        &[SupervisorState::Idle, SupervisorState::Terminated]
    );
    Ok(())
}
