//! Subprocess plumbing for a run: spawn, output capture, exit handling and
//! two-phase termination.
//!
//! ```text
//! spawn() --+-- stdout reader task --> `output` events
//!           +-- stderr reader task --> `stderr` events
//!           +-- waiter task (owns Child)
//!                  |  child.wait()  or  force_kill -> start_kill()
//!                  v
//!               detach handle, cancel `exited`, drain (or abort) readers,
//!               record exit
//! ```
//!
//! The two reader tasks append independently. Lines from one stream keep
//! their relative order; there is no ordering guarantee between a stdout
//! line and a stderr line written at about the same time.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::ProcessError;
use super::supervisor::Run;
use super::types::{EventCategory, RunStatus};

/// Delay between the graceful termination signal and the forced kill.
pub const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How long the waiter waits for the output pipes to drain once the
/// process has exited. Bounds the case of a grandchild keeping a pipe open.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Control handle for a live subprocess, owned by its [`Run`].
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    pid: Option<u32>,
    /// Fired by the grace timer; the waiter then force-kills the child.
    force_kill: CancellationToken,
    /// Fired by the waiter once the child has been reaped.
    exited: CancellationToken,
}

impl ProcessHandle {
    /// Send the graceful termination signal and arm the forced kill.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn terminate(&self) {
        self.send_sigterm();

        let force_kill = self.force_kill.clone();
        let exited = self.exited.clone();
        let pid = self.pid;
        tokio::spawn(async move {
            tokio::select! {
                () = exited.cancelled() => {
                    debug!(?pid, "process exited within grace period");
                }
                () = tokio::time::sleep(KILL_GRACE_PERIOD) => {
                    warn!(?pid, "process still alive after grace period, forcing kill");
                    force_kill.cancel();
                }
            }
        });
    }

    #[cfg(unix)]
    fn send_sigterm(&self) {
        let Some(pid) = self.pid else {
            return;
        };
        let Ok(raw) = i32::try_from(pid) else {
            return;
        };
        // SAFETY: `raw` is the pid of a child we spawned and have not yet
        // reaped; the waiter detaches this handle right after reaping.
        let ret = unsafe { libc::kill(raw, libc::SIGTERM) };
        if ret != 0 {
            debug!(pid, "SIGTERM delivery failed (process already gone?)");
        }
    }

    #[cfg(not(unix))]
    fn send_sigterm(&self) {
        // No graceful signal on this platform; go straight to the kill.
        self.force_kill.cancel();
    }
}

/// Spawn the agent for `run` and attach its [`ProcessHandle`].
///
/// The process runs in `working_dir`, inherits the environment and gets a
/// closed stdin: the agent is prompted only through `args`.
pub(crate) fn spawn(
    run: &Arc<Run>,
    bin: &str,
    args: &[String],
    working_dir: &Path,
) -> Result<(), ProcessError> {
    let mut child = Command::new(bin)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(ProcessError::Spawn)?;

    let pid = child.id();
    debug!(run_id = %run.id(), ?pid, bin, "agent process spawned");

    let force_kill = CancellationToken::new();
    let exited = CancellationToken::new();
    run.lock().process = Some(ProcessHandle {
        pid,
        force_kill: force_kill.clone(),
        exited: exited.clone(),
    });

    let stdout_task = child
        .stdout
        .take()
        .map(|pipe| tokio::spawn(pump_lines(Arc::clone(run), pipe, EventCategory::Output)));
    let stderr_task = child
        .stderr
        .take()
        .map(|pipe| tokio::spawn(pump_lines(Arc::clone(run), pipe, EventCategory::Stderr)));

    let run = Arc::clone(run);
    tokio::spawn(async move {
        let waited = tokio::select! {
            status = child.wait() => Some(status),
            () = force_kill.cancelled() => None,
        };
        let outcome = match waited {
            Some(outcome) => outcome,
            None => {
                if let Err(e) = child.start_kill() {
                    debug!(run_id = %run.id(), error = %e, "forced kill failed (process already exited?)");
                }
                child.wait().await
            }
        };
        // The pid is no longer ours once reaped; detach the handle before
        // anything else can signal it.
        run.lock().process = None;
        exited.cancel();

        let mut readers: Vec<JoinHandle<()>> = stdout_task.into_iter().chain(stderr_task).collect();
        let drain = async {
            for task in readers.iter_mut() {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(PIPE_DRAIN_TIMEOUT, drain).await.is_err() {
            warn!(run_id = %run.id(), "output pipes still open after process exit, dropping further output");
            // Nothing may be appended after the terminal status event.
            for task in &readers {
                task.abort();
            }
            for task in readers {
                let _ = task.await;
            }
        }

        record_exit(&run, outcome);
    });

    Ok(())
}

/// Read `pipe` line by line, appending each non-empty line to the run log.
async fn pump_lines<R>(run: Arc<Run>, pipe: R, category: EventCategory)
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(pipe).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(bytes)) => {
                let text = String::from_utf8_lossy(&bytes);
                let line = text.strip_suffix('\r').unwrap_or(&*text);
                if line.is_empty() {
                    continue;
                }
                debug!(run_id = %run.id(), stream = %category, line, "agent output");
                run.append(category, line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(run_id = %run.id(), stream = %category, error = %e, "error reading agent output");
                break;
            }
        }
    }
}

/// Apply the process outcome to the run.
///
/// A run that was interrupted keeps `stopped`; the exit is still logged.
fn record_exit(run: &Run, outcome: std::io::Result<ExitStatus>) {
    let mut state = run.lock();
    match outcome {
        Ok(status) => {
            if state.status == RunStatus::Running {
                state.status = if status.success() {
                    RunStatus::Succeeded
                } else {
                    RunStatus::Failed
                };
            }
            state.log.push(EventCategory::System, describe_exit(status));
        }
        Err(e) => {
            if state.status == RunStatus::Running {
                state.status = RunStatus::Failed;
            }
            state
                .log
                .push(EventCategory::Stderr, ProcessError::Wait(e).to_string());
        }
    }
    let status = state.status;
    state.log.push(EventCategory::Status, status.to_string());
    state.exit_recorded = true;

    info!(run_id = %run.id(), %status, "agent run finished");
}

fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("Process exited with code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("Process exited without an exit code (signal {signal})");
        }
    }
    "Process exited without an exit code".to_string()
}
