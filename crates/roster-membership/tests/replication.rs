//! Integration tests for membership replication across several processes.
//!
//! A tiny in-memory network stands in for the transport: every process is a
//! coordinator, and outbound messages are queued and delivered in FIFO
//! order (or deliberately out of order where a test says so).

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use roster_membership::{
    Destination, InstanceSlot, JoinPhase, MembershipCoordinator,
    MembershipEvent, Outbound, Role,
};
use roster_protocol::{
    Codec, ConnectionId, EncodedRecord, JsonCodec, MembershipMessage,
    PlayerRecord,
};

// =========================================================================
// Harness
// =========================================================================

fn cid(id: u64) -> ConnectionId {
    ConnectionId::new(id)
}

struct Process {
    coordinator: MembershipCoordinator,
    events: Arc<Mutex<Vec<MembershipEvent>>>,
}

impl Process {
    fn new(mut coordinator: MembershipCoordinator) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        coordinator.register_listener(move |e| sink.lock().unwrap().push(*e));
        Self {
            coordinator,
            events,
        }
    }

    fn events(&self) -> Vec<MembershipEvent> {
        self.events.lock().unwrap().clone()
    }

    fn names(&self) -> BTreeMap<u64, String> {
        self.coordinator
            .view()
            .iter()
            .map(|(id, r)| (id.into_inner(), r.display_name.clone()))
            .collect()
    }
}

/// The server process lives at `ConnectionId::HOST`; clients at their own ids.
struct Network {
    processes: BTreeMap<ConnectionId, Process>,
    queue: VecDeque<(ConnectionId, MembershipMessage)>,
}

impl Network {
    fn with_host(name: &str) -> Self {
        let guard = InstanceSlot::new().claim().unwrap();
        let server = MembershipCoordinator::server(
            guard,
            ConnectionId::HOST,
            PlayerRecord::new(name),
            JsonCodec,
        );
        let mut net = Self {
            processes: BTreeMap::new(),
            queue: VecDeque::new(),
        };
        net.processes.insert(ConnectionId::HOST, Process::new(server));
        let out = net
            .server()
            .coordinator
            .connection_established(ConnectionId::HOST)
            .unwrap();
        net.route(out);
        net.run();
        net
    }

    fn server(&mut self) -> &mut Process {
        self.processes.get_mut(&ConnectionId::HOST).unwrap()
    }

    fn process(&self, id: u64) -> &Process {
        &self.processes[&cid(id)]
    }

    /// Connects a client and lets its join complete.
    fn connect(&mut self, id: u64, name: &str) {
        self.connect_without_running(id, name);
        self.run();
    }

    fn connect_without_running(&mut self, id: u64, name: &str) {
        let guard = InstanceSlot::new().claim().unwrap();
        let client = MembershipCoordinator::client(
            guard,
            PlayerRecord::new(name),
            JsonCodec,
        );
        self.processes.insert(cid(id), Process::new(client));

        let out = self.server().coordinator.connection_established(cid(id)).unwrap();
        self.route(out);
        let out = self
            .processes
            .get_mut(&cid(id))
            .unwrap()
            .coordinator
            .connection_established(cid(id))
            .unwrap();
        self.route(out);
    }

    fn disconnect(&mut self, id: u64) {
        self.processes.remove(&cid(id));
        let out = self.server().coordinator.connection_lost(cid(id));
        self.route(out);
        self.run();
    }

    fn route(&mut self, out: Vec<Outbound>) {
        for Outbound {
            destination,
            message,
        } in out
        {
            match destination {
                Destination::Server => {
                    self.queue.push_back((ConnectionId::HOST, message));
                }
                Destination::AllClients => {
                    for id in self.processes.keys() {
                        self.queue.push_back((*id, message.clone()));
                    }
                }
            }
        }
    }

    fn run(&mut self) {
        while let Some((to, message)) = self.queue.pop_front() {
            let Some(process) = self.processes.get_mut(&to) else {
                continue;
            };
            let out = process.coordinator.handle_message(message).unwrap();
            self.route(out);
        }
    }
}

fn enc(name: &str) -> EncodedRecord {
    JsonCodec.encode_record(&PlayerRecord::new(name)).unwrap()
}

fn fresh_client() -> MembershipCoordinator {
    MembershipCoordinator::client(
        InstanceSlot::new().claim().unwrap(),
        PlayerRecord::new("observer"),
        JsonCodec,
    )
}

// =========================================================================
// End-to-end scenario
// =========================================================================

#[test]
fn test_host_alone_registers_itself_through_the_server_path() {
    let mut net = Network::with_host("Host");

    let host = net.server();
    assert_eq!(host.coordinator.role(), Role::Server);
    assert_eq!(host.coordinator.local_phase(), JoinPhase::Registered);
    assert_eq!(host.coordinator.count(), 1);
    assert_eq!(host.coordinator.id_at(0).unwrap(), ConnectionId::HOST);
    assert_eq!(
        host.events(),
        vec![MembershipEvent::PlayerAdded(ConnectionId::HOST)]
    );
}

#[test]
fn test_join_then_leave_end_to_end() {
    let mut net = Network::with_host("Host");
    net.connect(1, "Alice");

    let expected: BTreeMap<u64, String> =
        [(0, "Host".to_string()), (1, "Alice".to_string())].into();

    // Server registry and every view agree.
    {
        let server = net.server();
        let (ids, _) = server.coordinator.registry().unwrap().snapshot();
        assert_eq!(ids, vec![cid(0), cid(1)]);
    }
    assert_eq!(net.process(0).names(), expected);
    assert_eq!(net.process(1).names(), expected);

    // The host saw itself once and Alice once; no duplicate for itself.
    assert_eq!(
        net.process(0).events(),
        vec![
            MembershipEvent::PlayerAdded(cid(0)),
            MembershipEvent::PlayerAdded(cid(1)),
        ]
    );
    // Alice learns about both from one broadcast.
    let alice_events = net.process(1).events();
    assert_eq!(alice_events.len(), 2);
    assert!(alice_events.contains(&MembershipEvent::PlayerAdded(cid(0))));
    assert!(alice_events.contains(&MembershipEvent::PlayerAdded(cid(1))));
    assert_eq!(
        net.process(1).coordinator.local_phase(),
        JoinPhase::Registered
    );

    net.connect(2, "Bob");
    net.disconnect(1);

    let server = net.server();
    assert!(!server.coordinator.registry().unwrap().contains(cid(1)));
    assert_eq!(server.coordinator.ids(), vec![cid(0), cid(2)]);
    let removed = |p: &Process| {
        p.events()
            .iter()
            .filter(|e| **e == MembershipEvent::PlayerRemoved(cid(1)))
            .count()
    };
    assert_eq!(removed(net.process(0)), 1);
    assert_eq!(removed(net.process(2)), 1);
    assert_eq!(net.process(2).coordinator.ids(), vec![cid(0), cid(2)]);
}

#[test]
fn test_late_joiner_catches_up_from_one_broadcast() {
    let mut net = Network::with_host("Host");
    for (id, name) in [(1, "A"), (2, "B"), (3, "C")] {
        net.connect(id, name);
    }

    let late = net.process(3);
    assert_eq!(late.coordinator.ids(), vec![cid(0), cid(1), cid(2), cid(3)]);
    assert_eq!(late.events().len(), 4);
    // Early joiners got each later player exactly once.
    assert_eq!(net.process(1).events().len(), 4);
}

#[test]
fn test_concurrent_joins_are_serialized_by_the_server() {
    // Both join requests are in flight before either is processed.
    let mut net = Network::with_host("Host");
    net.connect_without_running(1, "Alice");
    net.connect_without_running(2, "Bob");
    net.run();

    let all = vec![cid(0), cid(1), cid(2)];
    for id in [0, 1, 2] {
        assert_eq!(net.process(id).coordinator.ids(), all);
        assert_eq!(net.process(id).events().len(), 3, "process {id}");
    }
}

#[test]
fn test_retransmitted_join_request_changes_nothing() {
    let mut net = Network::with_host("Host");
    net.connect(1, "Alice");
    let before = net.process(1).events().len();

    let out = net
        .server()
        .coordinator
        .handle_message(MembershipMessage::JoinRequest {
            connection_id: cid(1),
            record: enc("Alice"),
        })
        .unwrap();
    assert!(out.is_empty());
    net.route(out);
    net.run();

    assert_eq!(net.process(1).events().len(), before);
    assert_eq!(net.server().coordinator.registry().unwrap().len(), 2);
}

#[test]
fn test_clients_never_mutate_the_registry() {
    let mut net = Network::with_host("Host");
    net.connect(1, "Alice");

    // A client handed a join request ignores it and produces no traffic.
    let client = &mut net.processes.get_mut(&cid(1)).unwrap().coordinator;
    let out = client
        .handle_message(MembershipMessage::JoinRequest {
            connection_id: cid(9),
            record: enc("Mallory"),
        })
        .unwrap();
    assert!(out.is_empty());
    assert!(client.registry().is_none());
    assert!(!client.contains(cid(9)));
}

// =========================================================================
// Ordering properties
// =========================================================================

#[test]
fn test_out_of_order_snapshots_converge() {
    let s1_ids = vec![cid(0), cid(1)];
    let s1_recs = vec![enc("Host"), enc("Alice")];
    let s2_ids = vec![cid(0), cid(1), cid(2)];
    let s2_recs = vec![enc("Host"), enc("Alice"), enc("Bob")];

    let mut in_order = fresh_client();
    in_order.apply_join_broadcast(s1_ids.clone(), s1_recs.clone()).unwrap();
    in_order.apply_join_broadcast(s2_ids.clone(), s2_recs.clone()).unwrap();

    let mut reversed = fresh_client();
    reversed.apply_join_broadcast(s2_ids, s2_recs).unwrap();
    let late = reversed.apply_join_broadcast(s1_ids, s1_recs).unwrap();

    assert!(late.added.is_empty());
    assert_eq!(in_order.ids(), reversed.ids());
}

fn names_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[A-Za-z]{1,10}", 1..8)
}

proptest! {
    #[test]
    fn test_subset_snapshots_converge_in_any_order(
        names in names_strategy(),
        cut in any::<prop::sample::Index>(),
    ) {
        let ids: Vec<ConnectionId> = (0..names.len() as u64).map(cid).collect();
        let records: Vec<EncodedRecord> = names.iter().map(|n| enc(n)).collect();
        let k = cut.index(names.len() + 1);

        let mut forward = fresh_client();
        forward.apply_join_broadcast(ids[..k].to_vec(), records[..k].to_vec()).unwrap();
        forward.apply_join_broadcast(ids.clone(), records.clone()).unwrap();

        let mut backward = fresh_client();
        backward.apply_join_broadcast(ids.clone(), records.clone()).unwrap();
        backward.apply_join_broadcast(ids[..k].to_vec(), records[..k].to_vec()).unwrap();

        prop_assert_eq!(forward.ids(), backward.ids());
        for id in &ids {
            prop_assert_eq!(
                forward.record_of(*id).unwrap(),
                backward.record_of(*id).unwrap()
            );
        }
    }

    #[test]
    fn test_broadcast_twice_equals_once(names in names_strategy()) {
        let ids: Vec<ConnectionId> = (0..names.len() as u64).map(cid).collect();
        let records: Vec<EncodedRecord> = names.iter().map(|n| enc(n)).collect();

        let mut once = fresh_client();
        once.apply_join_broadcast(ids.clone(), records.clone()).unwrap();

        let mut twice = fresh_client();
        twice.apply_join_broadcast(ids.clone(), records.clone()).unwrap();
        let again = twice.apply_join_broadcast(ids, records).unwrap();

        prop_assert!(again.added.is_empty());
        prop_assert_eq!(once.ids(), twice.ids());
        prop_assert_eq!(once.count(), twice.count());
    }
}
