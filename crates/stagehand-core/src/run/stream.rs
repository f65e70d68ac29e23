//! Incremental delivery of a run's event log.
//!
//! A consumer holds a cursor (initially 0), receives only events beyond it,
//! and advances it past what it has been sent. The stream closes once the
//! run has finished and the cursor has caught up, so the terminal `status`
//! event is always delivered before the close.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;

use super::supervisor::{Run, RunSupervisor};
use super::types::{EventBatch, SequencedEvent};

/// Fallback wake-up interval while waiting for new events.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

impl RunSupervisor {
    /// Events of `run_id` beyond `cursor`, with the next cursor and whether
    /// the run has finished. An untracked run id is reported as finished
    /// with no events.
    pub fn poll_events(&self, run_id: &str, cursor: usize) -> EventBatch {
        match self.find_run(run_id) {
            Some(run) => run.batch_since(cursor),
            None => EventBatch {
                events: Vec::new(),
                cursor,
                finished: true,
            },
        }
    }

    /// Stream the events of `run_id` from `cursor` until the run finishes.
    ///
    /// The run is resolved once, when this is called. A consumer that falls
    /// behind keeps receiving the tail of that run even if a newer run
    /// replaces it in the slot. An unknown id yields an empty stream.
    pub fn stream_events(
        &self,
        run_id: &str,
        cursor: usize,
    ) -> Pin<Box<dyn Stream<Item = SequencedEvent> + Send>> {
        Box::pin(stream_run(self.find_run(run_id), cursor))
    }
}

fn stream_run(
    run: Option<Arc<Run>>,
    mut cursor: usize,
) -> impl Stream<Item = SequencedEvent> + Send + 'static {
    async_stream::stream! {
        let Some(run) = run else {
            return;
        };
        let mut changes = run.subscribe();

        loop {
            // Events and the finished flag come from one lock acquisition,
            // so `finished` here means the batch holds the full tail.
            let batch = run.batch_since(cursor);
            cursor = batch.cursor;
            for event in batch.events {
                yield event;
            }
            if batch.finished {
                break;
            }
            let _ = tokio::time::timeout(POLL_INTERVAL, changes.changed()).await;
        }
    }
}
