//! Event bus for in-process notifications.
//!
//! Registries and the topology publish [`CcuEvent`]s here; the publishers
//! that mirror derived state onto the message bus subscribe to them.

use crate::event::{CcuEvent, EventMetadata};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast event bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<(CcuEvent, EventMetadata)>,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the specified capacity.
    ///
    /// The capacity determines how many events are buffered for slow subscribers.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event with default metadata.
    ///
    /// If there are no subscribers the event is discarded. Returns `true` if
    /// there was at least one subscriber.
    pub fn publish(&self, event: CcuEvent) -> bool {
        self.publish_with_source(event, "system")
    }

    /// Publish an event with a custom source.
    pub fn publish_with_source(&self, event: CcuEvent, source: impl Into<String>) -> bool {
        let metadata = EventMetadata::new(source);
        self.tx.send((event, metadata)).is_ok()
    }

    /// Subscribe to all events.
    ///
    /// If the subscriber falls behind, older events may be dropped.
    pub fn subscribe(&self) -> EventBusReceiver {
        EventBusReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Subscribe to events matching a filter.
    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredReceiver<F>
    where
        F: Fn(&CcuEvent) -> bool + Send + 'static,
    {
        FilteredReceiver {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    /// Subscribe to pairing events only.
    pub fn pairing_events(&self) -> FilteredReceiver<fn(&CcuEvent) -> bool> {
        self.subscribe_filtered(CcuEvent::is_pairing_event as fn(&CcuEvent) -> bool)
    }

    /// Subscribe to layout events only.
    pub fn layout_events(&self) -> FilteredReceiver<fn(&CcuEvent) -> bool> {
        self.subscribe_filtered(CcuEvent::is_layout_event as fn(&CcuEvent) -> bool)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for all events from the event bus.
pub struct EventBusReceiver {
    rx: broadcast::Receiver<(CcuEvent, EventMetadata)>,
}

impl EventBusReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` once the event bus is closed.
    pub async fn recv(&mut self) -> Option<(CcuEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                // Missed some events, keep going with the newest ones
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<(CcuEvent, EventMetadata)> {
        self.rx.try_recv().ok()
    }
}

/// Receiver for filtered events from the event bus.
pub struct FilteredReceiver<F>
where
    F: Fn(&CcuEvent) -> bool + Send,
{
    rx: broadcast::Receiver<(CcuEvent, EventMetadata)>,
    filter: F,
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&CcuEvent) -> bool + Send,
{
    /// Receive the next event matching the filter.
    ///
    /// Returns `None` once the event bus is closed.
    pub async fn recv(&mut self) -> Option<(CcuEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok((event, meta)) => {
                    if (self.filter)(&event) {
                        return Some((event, meta));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a matching event without blocking.
    pub fn try_recv(&mut self) -> Option<(CcuEvent, EventMetadata)> {
        loop {
            match self.rx.try_recv() {
                Ok((event, meta)) => {
                    if (self.filter)(&event) {
                        return Some((event, meta));
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Drain every buffered matching event and return how many there were.
    pub fn drain_count(&mut self) -> usize {
        let mut count = 0;
        while self.try_recv().is_some() {
            count += 1;
        }
        count
    }
}

/// Shared event bus handle.
pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DeviceKind;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        assert!(bus.publish(CcuEvent::pairing_changed(DeviceKind::Module, "HBW-1")));

        let (event, meta) = rx.recv().await.unwrap();
        assert_eq!(event.type_name(), "PairingChanged");
        assert_eq!(meta.source, "system");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert!(!bus.publish(CcuEvent::pairing_reset(DeviceKind::Agv)));
    }

    #[tokio::test]
    async fn test_filtered_subscription() {
        let bus = EventBus::new();
        let mut rx = bus.layout_events();

        bus.publish(CcuEvent::pairing_reset(DeviceKind::Module));
        bus.publish(CcuEvent::LayoutChanged {
            node_count: 9,
            edge_count: 18,
            timestamp: 0,
        });

        let (event, _) = rx.recv().await.unwrap();
        assert!(matches!(event, CcuEvent::LayoutChanged { node_count: 9, .. }));
        assert_eq!(rx.drain_count(), 0);
    }
}
