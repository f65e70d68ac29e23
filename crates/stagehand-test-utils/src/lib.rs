//! Shared test utilities for stagehand integration tests.
//!
//! A [`Fixture`] is a throwaway project directory with an agents file, a
//! gate file, and helpers for writing small shell scripts that stand in
//! for real agents.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

use stagehand_core::agent::AgentRegistry;
use stagehand_core::run::{AGENT_EXECUTE_KEY, EnvFileGate, RunEvent, RunSupervisor};

/// How long [`wait_until_finished`] waits before giving up.
pub const FINISH_TIMEOUT: Duration = Duration::from_secs(15);

/// A temporary project with agent configuration.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    /// Create an empty project with execution enabled and no agents.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let fixture = Self { dir };
        std::fs::create_dir_all(fixture.config_dir()).expect("failed to create config dir");
        fixture.write_agents(&json!([]));
        fixture.enable_gate();
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root().join(".stagehand")
    }

    pub fn agents_path(&self) -> PathBuf {
        self.config_dir().join("agents.json")
    }

    pub fn gate_path(&self) -> PathBuf {
        self.config_dir().join(".env")
    }

    /// Overwrite the agents file with `agents` verbatim.
    pub fn write_agents(&self, agents: &Value) {
        let raw = serde_json::to_string_pretty(agents).expect("failed to serialize agents");
        std::fs::write(self.agents_path(), raw).expect("failed to write agents file");
    }

    /// Register a single agent that runs `bin` with `args`.
    pub fn with_agent(&self, id: &str, bin: &str, args: &[&str]) {
        self.write_agents(&json!([{
            "id": id,
            "name": id,
            "bin": bin,
            "args": args,
        }]));
    }

    pub fn enable_gate(&self) {
        std::fs::write(self.gate_path(), format!("{AGENT_EXECUTE_KEY}=true\n"))
            .expect("failed to write gate file");
    }

    pub fn disable_gate(&self) {
        std::fs::write(self.gate_path(), format!("{AGENT_EXECUTE_KEY}=false\n"))
            .expect("failed to write gate file");
    }

    /// Write an executable shell script under the config dir and return its
    /// absolute path.
    pub fn write_script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.config_dir().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("failed to write script");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("failed to chmod script");
        }
        path
    }

    /// Create `rel` (and its parents) under the project root.
    pub fn write_file(&self, rel: &str, contents: &str) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        std::fs::write(path, contents).expect("failed to write file");
    }

    /// A supervisor wired to this fixture's agents and gate files.
    pub fn supervisor(&self) -> RunSupervisor {
        RunSupervisor::new(
            AgentRegistry::new(self.agents_path()),
            EnvFileGate::new(self.gate_path()),
            self.root(),
        )
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll until `run_id` has finished and return its full event log.
///
/// Panics after [`FINISH_TIMEOUT`].
pub async fn wait_until_finished(supervisor: &RunSupervisor, run_id: &str) -> Vec<RunEvent> {
    let deadline = tokio::time::Instant::now() + FINISH_TIMEOUT;
    while !supervisor.is_finished(run_id) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "run {run_id} did not finish in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    supervisor.get_events(run_id)
}

/// Poll until the run's log has at least `count` events.
pub async fn wait_for_events(supervisor: &RunSupervisor, run_id: &str, count: usize) {
    let deadline = tokio::time::Instant::now() + FINISH_TIMEOUT;
    while supervisor.get_events(run_id).len() < count {
        assert!(
            tokio::time::Instant::now() < deadline,
            "run {run_id} never reached {count} events"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
