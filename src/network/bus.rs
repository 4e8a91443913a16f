//! Event Bus
//!
//! Topic-keyed publish/subscribe for decoded server messages and local
//! connection signals. Listeners are registered under an owner so a match
//! can drop all of its listeners at once when it ends.

use std::fmt;

use crate::network::protocol::{MessageCode, ServerMessage};

/// Listener handle returned by [`EventBus::subscribe`].
pub type ListenerId = u64;

/// Listener group, usually one per match or UI screen.
pub type OwnerId = u64;

/// What a listener subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusTopic {
    /// A server message with this code
    Message(MessageCode),
    /// First successful connection
    Connected,
    /// Connection restored after a drop
    Reconnected,
    /// Connection lost
    Disconnected,
    /// Local failure (transport error, send while closed)
    LocalError,
}

/// Something published on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// Decoded server message
    Message(ServerMessage),
    /// First successful connection
    Connected,
    /// Connection restored after a drop
    Reconnected,
    /// Connection lost
    Disconnected {
        /// Close reason from the transport
        reason: String,
    },
    /// Local failure
    LocalError(String),
}

impl BusEvent {
    /// Topic this event is delivered under.
    pub fn topic(&self) -> BusTopic {
        match self {
            BusEvent::Message(msg) => BusTopic::Message(msg.code()),
            BusEvent::Connected => BusTopic::Connected,
            BusEvent::Reconnected => BusTopic::Reconnected,
            BusEvent::Disconnected { .. } => BusTopic::Disconnected,
            BusEvent::LocalError(_) => BusTopic::LocalError,
        }
    }
}

type Callback = Box<dyn FnMut(&BusEvent) + Send>;

struct Listener {
    id: ListenerId,
    owner: OwnerId,
    topic: BusTopic,
    callback: Callback,
}

/// Listener registry.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
    next_id: ListenerId,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `topic`. Listeners on one topic are called
    /// in registration order.
    pub fn subscribe<F>(&mut self, topic: BusTopic, owner: OwnerId, callback: F) -> ListenerId
    where
        F: FnMut(&BusEvent) + Send + 'static,
    {
        self.next_id += 1;
        let id = self.next_id;
        self.listeners.push(Listener {
            id,
            owner,
            topic,
            callback: Box::new(callback),
        });
        id
    }

    /// Remove one listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    /// Remove every listener registered by `owner`. Returns how many.
    pub fn unsubscribe_all(&mut self, owner: OwnerId) -> usize {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.owner != owner);
        before - self.listeners.len()
    }

    /// Deliver `event` to its topic's listeners. Returns how many were called.
    pub fn publish(&mut self, event: &BusEvent) -> usize {
        let topic = event.topic();
        let mut delivered = 0;
        for listener in self.listeners.iter_mut().filter(|l| l.topic == topic) {
            (listener.callback)(event);
            delivered += 1;
        }
        delivered
    }

    /// Registered listener count.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// No listeners registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::{OperationResp, OPERATION_RESP};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter(bus: &mut EventBus, topic: BusTopic, owner: OwnerId) -> (ListenerId, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let id = bus.subscribe(topic, owner, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        (id, hits)
    }

    #[test]
    fn test_publish_by_topic() {
        let mut bus = EventBus::new();
        let (_, op_hits) = counter(&mut bus, BusTopic::Message(OPERATION_RESP), 1);
        let (_, conn_hits) = counter(&mut bus, BusTopic::Connected, 1);

        let delivered = bus.publish(&BusEvent::Message(ServerMessage::Operation(OperationResp { success: true })));
        assert_eq!(delivered, 1);
        bus.publish(&BusEvent::Reconnected);

        assert_eq!(op_hits.load(Ordering::SeqCst), 1);
        assert_eq!(conn_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribed_listener_not_called() {
        let mut bus = EventBus::new();
        let (id, hits) = counter(&mut bus, BusTopic::Connected, 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.publish(&BusEvent::Connected), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_all_by_owner() {
        let mut bus = EventBus::new();
        let (_, match_hits) = counter(&mut bus, BusTopic::Disconnected, 7);
        counter(&mut bus, BusTopic::Connected, 7);
        let (_, ui_hits) = counter(&mut bus, BusTopic::Disconnected, 2);

        assert_eq!(bus.unsubscribe_all(7), 2);
        assert_eq!(bus.len(), 1);

        bus.publish(&BusEvent::Disconnected { reason: "closed".into() });
        assert_eq!(match_hits.load(Ordering::SeqCst), 0);
        assert_eq!(ui_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_order() {
        let mut bus = EventBus::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            bus.subscribe(BusTopic::LocalError, 1, move |_| order.lock().unwrap().push(n));
        }
        bus.publish(&BusEvent::LocalError("boom".into()));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
