//! The server's authoritative registry.

use indexmap::IndexMap;
use roster_protocol::{ConnectionId, EncodedRecord};

use crate::MembershipError;

/// Canonical mapping from connection to the record it joined with.
///
/// Holds exactly one entry per participant whose join request has been
/// accepted and who has not disconnected since. Records stay in their
/// encoded form: the server stores and forwards them, it never needs to
/// read them.
///
/// Iteration follows insertion (join) order, and removal keeps the
/// relative order of the remaining entries, so [`id_at`](Self::id_at) and
/// the order of every join broadcast are stable.
///
/// Only a server-role [`MembershipCoordinator`](crate::MembershipCoordinator)
/// can create or mutate one. Everyone else gets `&ServerRegistry` at most.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    entries: IndexMap<ConnectionId, EncodedRecord>,
}

impl ServerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts a newly joined participant.
    ///
    /// Returns `false` (and leaves the existing entry untouched) if the id
    /// is already registered.
    pub(crate) fn insert(
        &mut self,
        id: ConnectionId,
        record: EncodedRecord,
    ) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, record);
        true
    }

    /// Removes a participant, keeping the order of everyone else.
    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<EncodedRecord> {
        self.entries.shift_remove(&id)
    }

    /// Returns the full registry as two index-aligned sequences, in join
    /// order. This is the payload of a join broadcast.
    pub fn snapshot(&self) -> (Vec<ConnectionId>, Vec<EncodedRecord>) {
        self.entries
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .unzip()
    }

    /// Returns the id registered at `index` in join order.
    pub fn id_at(&self, index: usize) -> Result<ConnectionId, MembershipError> {
        self.entries
            .get_index(index)
            .map(|(id, _)| *id)
            .ok_or(MembershipError::IndexOutOfRange {
                index,
                count: self.entries.len(),
            })
    }

    /// Looks up the encoded record for a participant.
    pub fn get(&self, id: ConnectionId) -> Option<&EncodedRecord> {
        self.entries.get(&id)
    }

    /// Returns `true` if the participant has completed its join.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Returns the number of registered participants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn rec(tag: u8) -> EncodedRecord {
        EncodedRecord::new(vec![tag])
    }

    #[test]
    fn test_insert_new_id_returns_true() {
        let mut registry = ServerRegistry::new();
        assert!(registry.insert(cid(1), rec(1)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(cid(1)), Some(&rec(1)));
    }

    #[test]
    fn test_insert_duplicate_keeps_first_record() {
        let mut registry = ServerRegistry::new();
        registry.insert(cid(1), rec(1));

        assert!(!registry.insert(cid(1), rec(2)));
        assert_eq!(registry.get(cid(1)), Some(&rec(1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_is_index_aligned_in_join_order() {
        let mut registry = ServerRegistry::new();
        registry.insert(cid(5), rec(5));
        registry.insert(cid(0), rec(0));
        registry.insert(cid(3), rec(3));

        let (ids, records) = registry.snapshot();
        assert_eq!(ids, vec![cid(5), cid(0), cid(3)]);
        assert_eq!(records, vec![rec(5), rec(0), rec(3)]);
    }

    #[test]
    fn test_remove_preserves_order_of_others() {
        let mut registry = ServerRegistry::new();
        for i in 0..4 {
            registry.insert(cid(i), rec(i as u8));
        }

        assert_eq!(registry.remove(cid(1)), Some(rec(1)));
        assert_eq!(registry.remove(cid(1)), None);

        let (ids, _) = registry.snapshot();
        assert_eq!(ids, vec![cid(0), cid(2), cid(3)]);
    }

    #[test]
    fn test_id_at_follows_join_order() {
        let mut registry = ServerRegistry::new();
        registry.insert(cid(7), rec(7));
        registry.insert(cid(2), rec(2));

        assert_eq!(registry.id_at(0).unwrap(), cid(7));
        assert_eq!(registry.id_at(1).unwrap(), cid(2));
    }

    #[test]
    fn test_id_at_out_of_range_reports_count() {
        let mut registry = ServerRegistry::new();
        registry.insert(cid(1), rec(1));

        let result = registry.id_at(1);
        assert!(matches!(
            result,
            Err(MembershipError::IndexOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn test_empty_registry_snapshot_is_empty() {
        let registry = ServerRegistry::new();
        let (ids, records) = registry.snapshot();
        assert!(ids.is_empty() && records.is_empty());
        assert!(registry.is_empty());
    }
}
