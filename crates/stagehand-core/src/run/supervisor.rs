//! The run supervisor: owner of the single active-run slot.
//!
//! At most one [`Run`] is `running` at any instant. [`RunSupervisor::start_run`]
//! and [`RunSupervisor::interrupt_run`] hold the slot mutex for their whole
//! check-and-mutate section, so two concurrent callers can never both
//! believe they started (or interrupted) the same run. The mutex is a
//! `std::sync::Mutex`: nothing awaits while holding it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::agent::{AgentRegistry, AgentSummary, ConfigError};

use super::error::{ConflictError, RunError};
use super::gate::ExecutionGate;
use super::log::EventLog;
use super::process::{self, ProcessHandle};
use super::types::{EventBatch, EventCategory, RunEvent, RunStatus, RunSummary};

/// Maximum number of prompt characters echoed into the start events.
pub const PROMPT_PREVIEW_CHARS: usize = 300;

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// One invocation of an agent with its accumulated events.
#[derive(Debug)]
pub struct Run {
    id: String,
    stage_id: String,
    prompt: String,
    agent_id: String,
    state: Mutex<RunState>,
}

#[derive(Debug)]
pub(crate) struct RunState {
    pub(crate) status: RunStatus,
    pub(crate) log: EventLog,
    /// Present only while the subprocess is alive.
    pub(crate) process: Option<ProcessHandle>,
    pub(crate) exit_recorded: bool,
}

impl Run {
    fn new(id: String, stage_id: &str, prompt: &str, agent_id: &str) -> Self {
        Self {
            id,
            stage_id: stage_id.to_string(),
            prompt: prompt.to_string(),
            agent_id: agent_id.to_string(),
            state: Mutex::new(RunState {
                status: RunStatus::Running,
                log: EventLog::new(),
                process: None,
                exit_recorded: false,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stage_id(&self) -> &str {
        &self.stage_id
    }

    /// The prompt the agent was actually given (after any override).
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn status(&self) -> RunStatus {
        self.lock().status
    }

    /// The agent process has exited and its outcome is in the log, or it
    /// never started. An interrupted run is `stopped` before this is true.
    pub fn has_exited(&self) -> bool {
        self.lock().exit_recorded
    }

    /// Snapshot copy of every event appended so far.
    pub fn events(&self) -> Vec<RunEvent> {
        self.lock().log.snapshot()
    }

    pub fn summary(&self) -> RunSummary {
        let status = self.status();
        RunSummary {
            run_id: self.id.clone(),
            stage_id: self.stage_id.clone(),
            agent_id: self.agent_id.clone(),
            status,
        }
    }

    /// Events beyond `cursor` plus the finished flag, read under one lock
    /// so a terminal status is never reported ahead of its events.
    pub fn batch_since(&self, cursor: usize) -> EventBatch {
        let state = self.lock();
        let events = state.log.since(cursor);
        EventBatch {
            cursor: cursor.max(state.log.len()),
            finished: state.status.is_terminal(),
            events,
        }
    }

    /// Receiver notified whenever the log grows.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.lock().log.subscribe()
    }

    pub(crate) fn append(&self, category: EventCategory, message: impl Into<String>) {
        self.lock().log.push(category, message);
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Owns the active-run slot and the subprocess lifecycle.
///
/// Only the most recent run is retained; it is replaced when a new run is
/// accepted.
#[derive(Debug)]
pub struct RunSupervisor {
    registry: AgentRegistry,
    gate: Arc<dyn ExecutionGate>,
    project_root: PathBuf,
    slot: Mutex<Option<Arc<Run>>>,
    run_counter: AtomicU64,
}

impl RunSupervisor {
    /// Create a supervisor that spawns agents in `project_root`.
    pub fn new(
        registry: AgentRegistry,
        gate: impl ExecutionGate + 'static,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            gate: Arc::new(gate),
            project_root: project_root.into(),
            slot: Mutex::new(None),
            run_counter: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// List the configured agents (read fresh from disk).
    pub fn list_agents(&self) -> Result<Vec<AgentSummary>, ConfigError> {
        self.registry.list()
    }

    /// Start a new run.
    ///
    /// Returns as soon as the process is spawned. A spawn failure does not
    /// fail this call: the returned summary already carries `failed` and
    /// the reason is in the event log.
    pub fn start_run(
        &self,
        stage_id: &str,
        prompt: &str,
        agent_id: &str,
    ) -> Result<RunSummary, RunError> {
        if !self.gate.is_enabled() {
            return Err(RunError::Disabled(self.gate.disabled_message()));
        }

        let mut slot = self.lock_slot();
        if slot.as_ref().is_some_and(|run| run.status() == RunStatus::Running) {
            return Err(ConflictError::AlreadyActive.into());
        }

        let config = self.registry.resolve(agent_id)?;
        if config.test_prompt.is_some() {
            info!(agent = %agent_id, "using configured test prompt");
        }
        let prompt = config.effective_prompt(prompt);

        let run = Arc::new(Run::new(self.next_run_id(), stage_id, prompt, agent_id));
        run.append(
            EventCategory::System,
            format!("Starting {} agent...", config.name),
        );
        run.append(
            EventCategory::System,
            format!("Prompt: {}", prompt_preview(prompt)),
        );
        run.append(EventCategory::Status, RunStatus::Running.to_string());

        *slot = Some(Arc::clone(&run));

        info!(
            run_id = %run.id(),
            stage_id = %stage_id,
            agent = %agent_id,
            "starting agent run"
        );

        // Spawn while still holding the slot so an interrupt cannot slip in
        // between publication and the process handle being attached.
        let args = config.build_args(prompt);
        if let Err(e) = process::spawn(&run, &config.bin, &args, &self.project_root) {
            warn!(run_id = %run.id(), error = %e, "agent spawn failed");
            let mut state = run.lock();
            state.status = RunStatus::Failed;
            state.exit_recorded = true;
            state.log.push(EventCategory::Stderr, e.to_string());
            state.log.push(EventCategory::Status, RunStatus::Failed.to_string());
        }

        Ok(run.summary())
    }

    /// Interrupt the active run.
    ///
    /// Sends a graceful termination signal and schedules a forced kill
    /// after [`process::KILL_GRACE_PERIOD`]. The run is marked `stopped`
    /// before this returns, independent of when the process actually dies.
    pub fn interrupt_run(&self) -> Result<RunSummary, RunError> {
        let slot = self.lock_slot();
        let run = slot.as_ref().ok_or(ConflictError::NoActiveRun)?;

        {
            let mut state = run.lock();
            if state.status != RunStatus::Running {
                return Err(ConflictError::NotRunning.into());
            }

            if let Some(handle) = state.process.as_ref() {
                handle.terminate();
            }

            state.status = RunStatus::Stopped;
            state
                .log
                .push(EventCategory::System, "Run interrupted by user");
            state
                .log
                .push(EventCategory::Status, RunStatus::Stopped.to_string());
        }

        info!(run_id = %run.id(), "agent run interrupted");
        Ok(run.summary())
    }

    /// The most recent run, whatever its status.
    pub fn current_run(&self) -> Option<Arc<Run>> {
        self.lock_slot().clone()
    }

    /// Whether a run is currently `running`.
    pub fn is_run_active(&self) -> bool {
        self.lock_slot()
            .as_ref()
            .is_some_and(|run| run.status() == RunStatus::Running)
    }

    /// The tracked run if its id matches `run_id`.
    pub fn find_run(&self, run_id: &str) -> Option<Arc<Run>> {
        self.lock_slot()
            .as_ref()
            .filter(|run| run.id() == run_id)
            .cloned()
    }

    /// Snapshot of the events of `run_id`; empty when that run is not the
    /// tracked one (never existed or superseded).
    pub fn get_events(&self, run_id: &str) -> Vec<RunEvent> {
        self.find_run(run_id)
            .map(|run| run.events())
            .unwrap_or_default()
    }

    /// True when `run_id` is not tracked, or is tracked and not running.
    pub fn is_finished(&self, run_id: &str) -> bool {
        self.find_run(run_id)
            .is_none_or(|run| run.status().is_terminal())
    }

    fn next_run_id(&self) -> String {
        let n = self.run_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("run-{n}-{}", Utc::now().timestamp_millis())
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Arc<Run>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The first [`PROMPT_PREVIEW_CHARS`] characters of `prompt`.
fn prompt_preview(prompt: &str) -> &str {
    match prompt.char_indices().nth(PROMPT_PREVIEW_CHARS) {
        Some((idx, _)) => &prompt[..idx],
        None => prompt,
    }
}
