//! Core of the stagehand dashboard.
//!
//! - [`agent`]: the agent definition registry (`agents.json`).
//! - [`run`]: the single-run supervisor, its event log and stream delivery.
//! - [`project`]: stage table, stage status and document access on disk.

pub mod agent;
pub mod project;
pub mod run;
