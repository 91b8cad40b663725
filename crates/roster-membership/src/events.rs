//! Membership events and the listener registry.

use std::fmt;

use roster_protocol::ConnectionId;

/// A change in the local view of membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MembershipEvent {
    /// A player entered this process's view.
    PlayerAdded(ConnectionId),
    /// A player left this process's view.
    PlayerRemoved(ConnectionId),
}

impl MembershipEvent {
    /// The player the event is about.
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            Self::PlayerAdded(id) | Self::PlayerRemoved(id) => *id,
        }
    }
}

impl fmt::Display for MembershipEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlayerAdded(id) => write!(f, "player {id} added"),
            Self::PlayerRemoved(id) => write!(f, "player {id} removed"),
        }
    }
}

/// Handle returned by listener registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&MembershipEvent) + Send>;

/// Registered callbacks, invoked synchronously in registration order.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    pub(crate) fn register(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(lid, _)| *lid != id);
        self.entries.len() != before
    }

    pub(crate) fn emit(&mut self, event: MembershipEvent) {
        for (_, listener) in &mut self.entries {
            listener(&event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Arc::clone(&log), log)
    }

    #[test]
    fn test_emit_runs_listeners_in_registration_order() {
        let (log, handle) = recorder();
        let mut listeners = Listeners::default();
        for name in ["first", "second"] {
            let log = Arc::clone(&log);
            listeners.register(Box::new(move |event| {
                log.lock().unwrap().push(format!("{name}: {event}"));
            }));
        }

        listeners.emit(MembershipEvent::PlayerAdded(ConnectionId::new(1)));

        assert_eq!(
            *handle.lock().unwrap(),
            vec![
                "first: player conn-1 added".to_string(),
                "second: player conn-1 added".to_string(),
            ]
        );
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let (log, handle) = recorder();
        let mut listeners = Listeners::default();
        let id = listeners.register(Box::new(move |event| {
            log.lock().unwrap().push(event.to_string());
        }));

        assert!(listeners.unregister(id));
        assert!(!listeners.unregister(id), "second unregister is a no-op");
        listeners.emit(MembershipEvent::PlayerRemoved(ConnectionId::new(2)));

        assert!(handle.lock().unwrap().is_empty());
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn test_event_connection_id() {
        let id = ConnectionId::new(3);
        assert_eq!(MembershipEvent::PlayerAdded(id).connection_id(), id);
        assert_eq!(MembershipEvent::PlayerRemoved(id).connection_id(), id);
    }
}
