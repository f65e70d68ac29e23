//! Agent definitions: which external command-line agents can be invoked.
//!
//! Agents are described by an operator-maintained JSON file:
//!
//! ```json
//! [
//!   { "id": "claude", "name": "Claude", "bin": "claude",
//!     "args": ["-p", "{{prompt}}"] },
//!   { "id": "echo", "name": "Echo", "bin": "/bin/echo",
//!     "args": ["{{prompt}}"], "test_prompt": "rehearsal" }
//! ]
//! ```
//!
//! The [`AgentRegistry`] re-reads this file on every lookup, so edits take
//! effect without restarting the server.

pub mod registry;
pub mod types;

pub use registry::{AgentRegistry, ConfigError};
pub use types::{AgentConfig, AgentSummary, PROMPT_PLACEHOLDER};
