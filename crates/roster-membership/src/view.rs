//! The derived per-process view of membership.

use std::collections::HashMap;

use roster_protocol::{ConnectionId, PlayerRecord};

/// Every process's local copy of who is connected.
///
/// Built only from join and leave broadcasts, so it can briefly lag the
/// server's registry while a join is in flight, but it never holds an id
/// the server has not registered at some point.
///
/// Insertion never overwrites: once an id is present its record is fixed
/// until the id leaves.
#[derive(Debug, Default)]
pub struct ClientView {
    players: HashMap<ConnectionId, PlayerRecord>,
}

impl ClientView {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a player if the id is not already present.
    ///
    /// Returns `true` if the player was added.
    pub(crate) fn insert_if_absent(
        &mut self,
        id: ConnectionId,
        record: PlayerRecord,
    ) -> bool {
        if self.players.contains_key(&id) {
            return false;
        }
        self.players.insert(id, record);
        true
    }

    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<PlayerRecord> {
        self.players.remove(&id)
    }

    /// Looks up a player's record.
    pub fn get(&self, id: ConnectionId) -> Option<&PlayerRecord> {
        self.players.get(&id)
    }

    /// Returns `true` if the player is in the view.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.players.contains_key(&id)
    }

    /// All ids in the view, sorted ascending.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.players.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Iterates over `(id, record)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &PlayerRecord)> {
        self.players.iter().map(|(id, record)| (*id, record))
    }

    /// Returns the number of players in the view.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Returns `true` if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
