use crate::agent::ConfigError;

/// Errors returned synchronously by the run supervisor.
///
/// Failures that happen after a run has been accepted (spawn failures,
/// non-zero exits) are never returned here; they are recorded in the
/// run's event log and terminal status instead.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The execution gate is off; no process was touched.
    #[error("{0}")]
    Disabled(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),
}

/// The active-run slot is not in the state the request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("a run is already active")]
    AlreadyActive,

    #[error("no active run")]
    NoActiveRun,

    #[error("run is not active")]
    NotRunning,
}

/// Subprocess failures, rendered into `stderr` events.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to start: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Process error: {0}")]
    Wait(#[source] std::io::Error),
}
