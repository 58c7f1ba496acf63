//! Event relay: forwards adapter event channels onto the bus.
//!
//! Adapters hand their events to a plain `mpsc` channel. The relay
//! republishes each one and derives notifications from observed wire
//! commands: a level set at the wall becomes a `ZoneLevelChanged`.

use std::sync::Arc;

use tokio::sync::mpsc;

use homewire_domain::command::Command;
use homewire_domain::event::Event;

use crate::ports::{EventPublisher, SystemRegistry};

/// Republishes events from one or more producers.
pub struct EventRelay<P> {
    publisher: P,
    registry: Arc<dyn SystemRegistry>,
}

impl<P: EventPublisher + Send + Sync> EventRelay<P> {
    pub fn new(publisher: P, registry: Arc<dyn SystemRegistry>) -> Self {
        Self {
            publisher,
            registry,
        }
    }

    /// The notification implied by `event`, if any.
    #[must_use]
    pub fn translate(&self, event: &Event) -> Option<Event> {
        let Event::CommandObserved {
            command: Command::ZoneSetLevel { zone_id, level, .. },
            ..
        } = event
        else {
            return None;
        };
        let zone = self.registry.resolve_zone(zone_id)?;
        Some(Event::ZoneLevelChanged {
            zone_id: zone.id.clone(),
            zone_name: zone.name.clone(),
            level: *level,
        })
    }

    /// Forward every event from `events` until the channel closes.
    #[tracing::instrument(skip(self, events))]
    pub async fn run(&self, source: &str, mut events: mpsc::Receiver<Event>) {
        while let Some(event) = events.recv().await {
            tracing::trace!(event = event.kind(), "relaying event");
            let derived = self.translate(&event);
            if let Err(err) = self.publisher.publish(event).await {
                tracing::warn!(error = %err, "failed to publish event");
            }
            if let Some(derived) = derived {
                if let Err(err) = self.publisher.publish(derived).await {
                    tracing::warn!(error = %err, "failed to publish event");
                }
            }
        }
        tracing::debug!("event source closed");
    }
}
