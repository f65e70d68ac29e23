//! Append-only event log with change notification.

use tokio::sync::watch;

use super::types::{EventCategory, RunEvent, SequencedEvent};

/// The ordered record of everything a run emitted.
///
/// Events are never edited or removed. Every append bumps a
/// [`watch`] channel carrying the new length so stream consumers can wait
/// for growth instead of spinning.
#[derive(Debug)]
pub struct EventLog {
    events: Vec<RunEvent>,
    len_tx: watch::Sender<usize>,
}

impl EventLog {
    pub fn new() -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            events: Vec::new(),
            len_tx,
        }
    }

    /// Append an event and return its sequence number.
    pub fn push(&mut self, category: EventCategory, message: impl Into<String>) -> usize {
        let seq = self.events.len();
        self.events.push(RunEvent::new(category, message));
        self.len_tx.send_replace(self.events.len());
        seq
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Copy of the whole log.
    pub fn snapshot(&self) -> Vec<RunEvent> {
        self.events.clone()
    }

    /// Copy of every event at position `>= cursor`, with sequence numbers.
    /// A cursor past the end yields nothing.
    pub fn since(&self, cursor: usize) -> Vec<SequencedEvent> {
        let start = cursor.min(self.events.len());
        self.events[start..]
            .iter()
            .enumerate()
            .map(|(offset, event)| SequencedEvent {
                seq: start + offset,
                event: event.clone(),
            })
            .collect()
    }

    /// Receiver that is notified whenever the log grows.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.len_tx.subscribe()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
