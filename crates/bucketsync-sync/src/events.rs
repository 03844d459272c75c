//! Engine event stream
//!
//! A single broadcast channel carries every [`SyncEvent`] of an engine:
//! one-shot batches, watch-triggered batches and session lifecycle events.
//! Subscribers that fall behind lose the oldest events (`RecvError::Lagged`)
//! rather than blocking the batch that emits them.
//!
//! Every batch emits exactly one terminal event, and it is that batch's last
//! event. A lagging subscriber therefore still receives it unless more than
//! `capacity` newer events (from other batches or sessions) follow before it
//! reads again. Subscribers that must account for every batch should drain
//! promptly or size the capacity for the number of concurrent sessions.

use bucketsync_core::domain::SyncEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of events buffered per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Cloneable sender side of the engine's event stream
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to all events emitted after this call
    ///
    /// On `RecvError::Lagged(n)` the `n` oldest unread events are gone and the
    /// receiver continues with the oldest event still buffered.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; a stream without subscribers drops it
    pub fn emit(&self, event: SyncEvent) {
        if self.sender.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
