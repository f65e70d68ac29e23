use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Stopped,
}

impl RunStatus {
    /// Whether the run has left the `running` state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.pad(s)
    }
}

// ---------------------------------------------------------------------------

/// Category of a run event; also the SSE event name on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Lifecycle notices from the supervisor.
    System,
    /// A line the agent wrote to stdout.
    Output,
    /// A line the agent wrote to stderr, or a spawn/wait failure.
    Stderr,
    /// A status transition; the message is the [`RunStatus`] string.
    Status,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Output => "output",
            Self::Stderr => "stderr",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A single timestamped entry in a run's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvent {
    pub timestamp: DateTime<Utc>,
    pub category: EventCategory,
    pub message: String,
}

impl RunEvent {
    pub fn new(category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            message: message.into(),
        }
    }
}

/// An event paired with its position in the log.
///
/// `seq` is the event's index in append order. A client that has seen
/// `seq = n` resumes from cursor `n + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequencedEvent {
    pub seq: usize,
    #[serde(flatten)]
    pub event: RunEvent,
}

/// Result of one incremental poll of a run's log.
#[derive(Debug, Clone, Serialize)]
pub struct EventBatch {
    /// Events at positions at or after the requested cursor.
    pub events: Vec<SequencedEvent>,
    /// Cursor to send with the next poll.
    pub cursor: usize,
    /// The run is no longer `running` (or is not tracked). Once this is
    /// true and `events` is empty, the stream is closed.
    pub finished: bool,
}

/// Client-facing summary of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub stage_id: String,
    pub agent_id: String,
    pub status: RunStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_display_matches_serde() {
        for status in [
            RunStatus::Running,
            RunStatus::Succeeded,
            RunStatus::Failed,
            RunStatus::Stopped,
        ] {
            assert_eq!(serde_json::to_value(status).unwrap(), status.to_string());
        }
        assert_eq!(format!("{:<9}|", RunStatus::Failed), "failed   |");
    }

    #[test]
    fn only_running_is_non_terminal() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Stopped.is_terminal());
    }

    #[test]
    fn sequenced_event_serializes_flat() {
        let event = SequencedEvent {
            seq: 4,
            event: RunEvent::new(EventCategory::Stderr, "boom"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["seq"], 4);
        assert_eq!(json["category"], "stderr");
        assert_eq!(json["message"], "boom");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn run_summary_uses_camel_case() {
        let summary = RunSummary {
            run_id: "run-1-0".to_string(),
            stage_id: "00".to_string(),
            agent_id: "echo".to_string(),
            status: RunStatus::Running,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["runId"], "run-1-0");
        assert_eq!(json["stageId"], "00");
        assert_eq!(json["status"], "running");
    }
}
