use tokio::sync::broadcast;
use tracing::trace;

use courier_protocol::Event;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Shared fan-out channel for session lifecycle events.
///
/// Every subscriber receives every event, tagged with its tenant id. There is
/// no buffering or replay: a subscriber joining after an event was published
/// never sees it, and a subscriber that falls behind by more than the channel
/// capacity observes a `Lagged` gap.
pub struct EventBroker {
    tx: broadcast::Sender<Event>,
}

impl EventBroker {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        // A send error only means there are no subscribers right now.
        if self.tx.send(event).is_err() {
            trace!("event published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
