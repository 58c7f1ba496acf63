//! Event bus port: publish/subscribe for domain events.

use std::future::Future;

use homewire_domain::error::HubError;
use homewire_domain::event::Event;

/// Publishes domain events to interested subscribers.
///
/// Implementations must not block indefinitely on a slow subscriber.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), HubError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), HubError>> + Send {
        (**self).publish(event)
    }
}
