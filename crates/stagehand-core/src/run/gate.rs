//! Execution gate: the out-of-band switch that permits spawning agents.
//!
//! Off unless the operator opts in. Consulted on every start request and
//! never cached.

use std::fmt;
use std::path::{Path, PathBuf};

/// Key looked up in the gate file.
pub const AGENT_EXECUTE_KEY: &str = "STAGEHAND_AGENT_EXECUTE";

/// Decides whether agent subprocesses may be spawned right now.
pub trait ExecutionGate: Send + Sync + fmt::Debug {
    /// Check the gate. Implementations must not cache the answer.
    fn is_enabled(&self) -> bool;

    /// Actionable message shown when the gate is off.
    fn disabled_message(&self) -> String;
}

/// Gate backed by a dotenv-style file containing
/// `STAGEHAND_AGENT_EXECUTE=true`.
///
/// A missing or unreadable file means disabled.
#[derive(Debug, Clone)]
pub struct EnvFileGate {
    path: PathBuf,
}

impl EnvFileGate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExecutionGate for EnvFileGate {
    fn is_enabled(&self) -> bool {
        match read_flag(&self.path) {
            Ok(enabled) => enabled,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "gate file unreadable, agent execution disabled");
                false
            }
        }
    }

    fn disabled_message(&self) -> String {
        format!(
            "AI agent execution is disabled. Set {AGENT_EXECUTE_KEY}=true in {} at your own risk, \
             preferably on a dedicated machine or inside a container.",
            self.path.display()
        )
    }
}

/// Fixed gate, for tests and embedding.
#[derive(Debug, Clone, Copy)]
pub struct StaticGate(pub bool);

impl ExecutionGate for StaticGate {
    fn is_enabled(&self) -> bool {
        self.0
    }

    fn disabled_message(&self) -> String {
        "AI agent execution is disabled.".to_string()
    }
}

/// Value of the first `STAGEHAND_AGENT_EXECUTE` assignment in a dotenv
/// file; true when it is `true` (case-insensitive). Quoting and `export`
/// prefixes follow dotenv rules.
fn read_flag(path: &Path) -> Result<bool, dotenvy::Error> {
    for item in dotenvy::from_path_iter(path)? {
        let (key, value) = item?;
        if key == AGENT_EXECUTE_KEY {
            return Ok(value.trim().eq_ignore_ascii_case("true"));
        }
    }
    Ok(false)
}
