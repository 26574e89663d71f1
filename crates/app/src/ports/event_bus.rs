//! Event bus port — publish/subscribe for controller events.

use std::future::Future;

use mipirobot_domain::event::Event;

/// Publishes controller events to interested observers.
///
/// Publishing cannot fail from the controller's point of view: an observer
/// that went away simply misses the event.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: Event) -> impl Future<Output = ()> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = ()> + Send {
        (**self).publish(event)
    }
}
