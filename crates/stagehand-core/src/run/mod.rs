//! Agent runs: the single-run supervisor and its event stream.
//!
//! # Architecture
//!
//! ```text
//! start_run(stage, prompt, agent)
//!     |
//!     v
//! ExecutionGate --off--> RunError::Disabled
//!     |
//! RunSupervisor (slot: Option<Arc<Run>>) --running--> ConflictError
//!     |
//!     +-- AgentRegistry::resolve(agent) --> AgentConfig
//!     |
//!     +-- Run { status, EventLog, ProcessHandle }
//!              ^            ^
//!              |            +-- stdout / stderr reader tasks
//!              +-- waiter task (exit) / interrupt_run (stop)
//!
//! poll_events(run, cursor) / stream_events(run, cursor) --> client
//! ```

pub mod error;
pub mod gate;
pub mod log;
pub mod process;
pub mod stream;
pub mod supervisor;
pub mod types;

pub use error::{ConflictError, ProcessError, RunError};
pub use gate::{AGENT_EXECUTE_KEY, EnvFileGate, ExecutionGate, StaticGate};
pub use log::EventLog;
pub use process::KILL_GRACE_PERIOD;
pub use stream::POLL_INTERVAL;
pub use supervisor::{PROMPT_PREVIEW_CHARS, Run, RunSupervisor};
pub use types::{EventBatch, EventCategory, RunEvent, RunStatus, RunSummary, SequencedEvent};
