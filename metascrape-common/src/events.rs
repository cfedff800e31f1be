//! Progress events for batch resolution
//!
//! The resolver emits `ScrapeEvent`s on an `EventBus` so that a CLI or any
//! other host can report progress without the engine knowing about it.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted while resolving a batch of drafts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScrapeEvent {
    /// Batch accepted
    BatchStarted {
        /// Batch identifier
        batch_id: Uuid,
        /// Number of drafts in the batch
        total: usize,
        /// When the batch started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One draft finished (or bypassed the pipeline because it was complete)
    DraftResolved {
        batch_id: Uuid,
        /// Drafts finished so far, including this one
        completed: usize,
        total: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A source failed while resolving a draft
    ///
    /// Informational only. The draft keeps whatever other sources supplied.
    SourceFailed {
        batch_id: Uuid,
        /// Source name (`dblp`, `crossref`, `paperlib`, ...)
        source: String,
        /// Error message
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Every draft in the batch finished
    BatchCompleted {
        batch_id: Uuid,
        total: usize,
        /// Drafts that were complete when the batch finished
        complete: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ScrapeEvent {
    /// Batch the event belongs to
    pub fn batch_id(&self) -> Uuid {
        match self {
            ScrapeEvent::BatchStarted { batch_id, .. }
            | ScrapeEvent::DraftResolved { batch_id, .. }
            | ScrapeEvent::SourceFailed { batch_id, .. }
            | ScrapeEvent::BatchCompleted { batch_id, .. } => *batch_id,
        }
    }
}

/// Broadcast bus for `ScrapeEvent`s
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScrapeEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ScrapeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ScrapeEvent,
    ) -> Result<usize, broadcast::error::SendError<ScrapeEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ScrapeEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
