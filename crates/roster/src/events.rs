//! Fan-out of membership events to async subscribers.
//!
//! Each subscriber gets its own unbounded queue, so a burst of events (a
//! late joiner applying a snapshot of every player at once) is delivered
//! in full no matter how far behind the subscriber is. Nothing is ever
//! dropped for lag; a subscriber that stops reading just holds memory.

use std::sync::{Arc, Mutex, PoisonError};

use roster_membership::MembershipEvent;
use tokio::sync::mpsc;

/// Shared list of subscriber queues. Clones publish to the same list.
#[derive(Clone, Default)]
pub(crate) struct EventHub {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<MembershipEvent>>>>,
}

impl EventHub {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber that sees every event published after this call.
    pub(crate) fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        EventStream { receiver: rx }
    }

    /// Delivers `event` to every live subscriber, forgetting dropped ones.
    pub(crate) fn publish(&self, event: MembershipEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event).is_ok());
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A stream of membership events, in the order the node raised them.
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<MembershipEvent>,
}

impl EventStream {
    /// Waits for the next event. Returns `None` once the node and every
    /// handle to it are gone.
    pub async fn recv(&mut self) -> Option<MembershipEvent> {
        self.receiver.recv().await
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<MembershipEvent> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use roster_protocol::ConnectionId;

    use super::*;

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let hub = EventHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish(MembershipEvent::PlayerAdded(ConnectionId::HOST));

        assert_eq!(
            a.try_recv(),
            Some(MembershipEvent::PlayerAdded(ConnectionId::HOST))
        );
        assert_eq!(
            b.try_recv(),
            Some(MembershipEvent::PlayerAdded(ConnectionId::HOST))
        );
    }

    #[test]
    fn test_burst_larger_than_any_buffer_is_kept_whole() {
        let hub = EventHub::new();
        let mut stream = hub.subscribe();

        for id in 0..1_000 {
            hub.publish(MembershipEvent::PlayerAdded(ConnectionId::new(id)));
        }

        let mut received = 0;
        while let Some(event) = stream.try_recv() {
            assert_eq!(
                event,
                MembershipEvent::PlayerAdded(ConnectionId::new(received))
            );
            received += 1;
        }
        assert_eq!(received, 1_000);
    }

    #[test]
    fn test_dropped_subscriber_is_forgotten() {
        let hub = EventHub::new();
        let stream = hub.subscribe();
        drop(stream);

        hub.publish(MembershipEvent::PlayerRemoved(ConnectionId::new(1)));

        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let hub = EventHub::new();
        hub.publish(MembershipEvent::PlayerAdded(ConnectionId::new(1)));

        let mut late = hub.subscribe();

        assert_eq!(late.try_recv(), None);
    }
}
