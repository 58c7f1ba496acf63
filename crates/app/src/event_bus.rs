//! Fan-out of hub events to every interested task.
//!
//! Adapters, report consumers and the relay all meet here. The bus sits on
//! a tokio [`broadcast`] channel, so each subscriber owns a cursor into a
//! shared ring of `capacity` events. A slow subscriber loses the oldest
//! events (it sees `RecvError::Lagged`) and the publisher never waits.

use std::future::Future;

use tokio::sync::broadcast;

use homewire_domain::error::HubError;
use homewire_domain::event::Event;

use crate::ports::EventPublisher;

pub struct InProcessEventBus {
    sender: broadcast::Sender<Event>,
}

impl InProcessEventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receiver for events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), HubError>> + Send {
        // an event nobody listens to is not a fault
        if let Err(err) = self.sender.send(event) {
            tracing::trace!(event = err.0.kind(), "no subscriber for event");
        }
        async { Ok(()) }
    }
}
