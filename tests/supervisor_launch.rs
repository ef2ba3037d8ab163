mod common;

use std::path::Path;

use common::{Harness, TestResult};
use queuewarden::console::Style;
use queuewarden::fs::FileSystem;
use queuewarden::process::OutputMode;
use queuewarden::supervisor::{RunMode, Surface, SupervisorState};
use queuewarden::types::LaunchKind;
use queuewarden::worker::WorkerFamily;
use queuewarden_test_utils::builders::{ConfigFileBuilder, WorkerSpecBuilder};
use queuewarden_test_utils::fake_spawner::ScriptedProcess;

const WORKER_PID_FILE: &str = "var/cache/resque_high-low.pid";

#[tokio::test]
async fn background_launch_records_reported_pid() -> TestResult {
    let mut h = Harness::new();
    h.spawner
        .script(ScriptedProcess::exits(0).with_pid(10).stdout("4242"));
    let config = ConfigFileBuilder::new()
        .with_redis("10.0.0.5", 6379)
        .with_runtime("php")
        .build();
    let mut supervisor = h.supervisor(config);
    let spec = WorkerSpecBuilder::new("high,low", WorkerFamily::Base)
        .count(2)
        .build();

    let code = supervisor
        .run(&spec, Surface::Subprocess(LaunchKind::Worker))
        .await?;

    assert_eq!(code, 0);
    assert_eq!(h.fs.contents(WORKER_PID_FILE).as_deref(), Some("4242"));

    let started = h.console.texts(Style::Text);
    assert_eq!(started.len(), 1);
    assert!(started[0].starts_with("Worker started "), "{}", started[0]);
    assert!(started[0].ends_with(":4242:high,low"), "{}", started[0]);

    let spawned = h.spawner.spawned();
    assert_eq!(spawned.len(), 1);
    let cmd = &spawned[0];
    assert_eq!(cmd.program, "sh");
    assert_eq!(
        cmd.args[1],
        "nohup php vendor/bin/resque > var/log/resque.log 2>&1 & echo $!"
    );
    assert_eq!(cmd.env.get("QUEUE"), Some("high,low"));
    assert_eq!(cmd.env.get("COUNT"), Some("2"));
    assert_eq!(cmd.env.get("REDIS_BACKEND"), Some("10.0.0.5:6379"));
    assert!(cmd.env.pid_file().is_some());
    assert!(!cmd.env.contains("QUEUEWARDEN_LOG"));

    assert_eq!(
        supervisor.history(),
        &[
            SupervisorState::Idle,
            SupervisorState::Launching,
            SupervisorState::Running(RunMode::Background),
            SupervisorState::Terminated,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn existing_pid_file_blocks_launch_without_force() -> TestResult {
    let mut h = Harness::new();
    h.fs.add_file(WORKER_PID_FILE, "777");
    let mut supervisor = h.supervisor(ConfigFileBuilder::new().build());
    let spec = WorkerSpecBuilder::new("high,low", WorkerFamily::Base).build();

    let code = supervisor
        .run(&spec, Surface::Subprocess(LaunchKind::Worker))
        .await?;

    assert_eq!(code, 1);
    assert_eq!(h.spawner.spawn_count(), 0);
    assert_eq!(h.fs.contents(WORKER_PID_FILE).as_deref(), Some("777"));
    let errors = h.console.texts(Style::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("use --force to override"), "{}", errors[0]);
    Ok(())
}

#[tokio::test]
async fn force_replaces_existing_pid_file() -> TestResult {
    let mut h = Harness::new();
    h.fs.add_file(WORKER_PID_FILE, "777");
    h.spawner.script(ScriptedProcess::exits(0).stdout("888"));
    let mut supervisor = h.supervisor(ConfigFileBuilder::new().build());
    let spec = WorkerSpecBuilder::new("high,low", WorkerFamily::Base)
        .force()
        .build();

    let code = supervisor
        .run(&spec, Surface::Subprocess(LaunchKind::Worker))
        .await?;

    assert_eq!(code, 0);
    assert_eq!(h.spawner.spawn_count(), 1);
    assert_eq!(h.fs.contents(WORKER_PID_FILE).as_deref(), Some("888"));
    Ok(())
}

#[tokio::test]
async fn failing_launcher_is_a_launch_error() -> TestResult {
    let mut h = Harness::new();
    h.spawner
        .script(ScriptedProcess::exits(127).stderr("sh: vendor/bin/resque-single: not found"));
    let mut supervisor = h.supervisor(ConfigFileBuilder::new().build());
    let spec = WorkerSpecBuilder::new("mail", WorkerFamily::Single).build();

    let err = supervisor
        .run(&spec, Surface::Subprocess(LaunchKind::Single))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("launcher exited with status 127"), "{err}");
    assert!(!h.fs.exists(Path::new("var/cache/resque-single_mail.pid")));
    assert_eq!(supervisor.state(), SupervisorState::Terminated);
    Ok(())
}

#[tokio::test]
async fn foreground_streams_output_and_returns_exit_code() -> TestResult {
    let mut h = Harness::new();
    h.spawner.script(
        ScriptedProcess::exits(3)
            .with_pid(555)
            .stdout("*** Starting worker")
            .stderr("warning: low memory")
            .stdout("*** Exiting"),
    );
    let mut supervisor = h.supervisor(ConfigFileBuilder::new().with_runtime("php").build());
    let spec = WorkerSpecBuilder::new("mail", WorkerFamily::Single)
        .foreground()
        .memory_limit(128)
        .build();

    let code = supervisor
        .run(&spec, Surface::Subprocess(LaunchKind::Single))
        .await?;

    assert_eq!(code, 3);
    assert_eq!(
        h.console.texts(Style::WorkerStdout),
        vec!["*** Starting worker", "*** Exiting"]
    );
    assert_eq!(h.console.texts(Style::WorkerStderr), vec!["warning: low memory"]);
    assert!(!h.fs.exists(Path::new("var/cache/resque-single_mail.pid")));

    let cmd = &h.spawner.spawned()[0];
    assert_eq!(cmd.program, "php");
    assert_eq!(
        cmd.args,
        vec!["-d", "memory_limit=128M", "vendor/bin/resque-single"]
    );
    assert!(!cmd.env.contains("PIDFILE"));
    assert!(!cmd.env.contains("COUNT"));
    assert_eq!(cmd.output, OutputMode::Capture);
    assert_eq!(
        supervisor.history()[2],
        SupervisorState::Running(RunMode::Foreground)
    );
    Ok(())
}

#[tokio::test]
async fn scheduled_worker_gets_verbosity_mirrored() -> TestResult {
    let mut h = Harness::new();
    h.spawner.script(ScriptedProcess::exits(0).stdout("99"));
    let mut supervisor = h.supervisor(ConfigFileBuilder::new().build());
    let spec = WorkerSpecBuilder::new("delayed", WorkerFamily::Scheduler)
        .verbosity(2)
        .blocking()
        .build();

    let code = supervisor
        .run(&spec, Surface::Subprocess(LaunchKind::Scheduled))
        .await?;

    assert_eq!(code, 0);
    let env = &h.spawner.spawned()[0].env;
    assert_eq!(env.get("VVERBOSE"), Some("1"));
    assert_eq!(env.get("BLOCKING"), Some("1"));
    assert_eq!(env.get("WORKER_CLASS"), Some("scheduler"));
    assert_eq!(
        h.fs.contents("var/cache/resque-scheduler_delayed.pid").as_deref(),
        Some("99")
    );
    Ok(())
}
