#![allow(dead_code)]

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use queuewarden::config::ConfigFile;
use queuewarden::console::Console;
use queuewarden::fs::mock::MockFileSystem;
use queuewarden::process::Signal;
use queuewarden::supervisor::Supervisor;
use queuewarden_test_utils::fake_spawner::FakeSpawner;
use tokio::sync::mpsc;

pub use queuewarden_test_utils::init_tracing;

pub type TestResult = Result<(), Box<dyn Error>>;

/// Fakes shared between a test and the supervisor it drives.
pub struct Harness {
    pub spawner: FakeSpawner,
    pub fs: MockFileSystem,
    pub console: Console,
    pub signals_tx: mpsc::Sender<Signal>,
    signals_rx: Option<mpsc::Receiver<Signal>>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let (signals_tx, signals_rx) = mpsc::channel(8);
        Self {
            spawner: FakeSpawner::new(),
            fs: MockFileSystem::new(),
            console: Console::captured(),
            signals_tx,
            signals_rx: Some(signals_rx),
        }
    }

    /// Supervisor wired to the fakes. Can be called once per harness.
    pub fn supervisor(&mut self, config: ConfigFile) -> Supervisor {
        let signals = self
            .signals_rx
            .take()
            .expect("supervisor() called twice on one harness");

        Supervisor::new(config, Arc::new(self.spawner.clone()), Arc::new(self.fs.clone()))
            .with_console(self.console.clone())
            .with_host_env(host_env())
            .with_signals(signals)
            .with_self_exe("/opt/queuewarden/bin/queuewarden")
    }
}

pub fn host_env() -> BTreeMap<String, String> {
    [("PATH", "/usr/bin:/bin"), ("HOME", "/home/app"), ("QUEUEWARDEN_LOG", "debug")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
