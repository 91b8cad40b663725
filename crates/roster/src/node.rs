//! Membership node: an isolated Tokio task that owns a coordinator.
//!
//! Every transport signal, received message, and query becomes a
//! [`Command`] on one bounded mpsc queue, and the node handles them one at
//! a time. That single consumer is what guarantees two join requests (or a
//! join and a disconnect) are never processed interleaved.
//!
//! Messages a server addresses to itself (the host's own join request, and
//! its copy of every broadcast) go on a local loopback queue that is fully
//! drained before the next command is taken.

use std::collections::{HashMap, VecDeque};

use roster_membership::{
    Destination, MembershipCoordinator, MembershipError, MembershipEvent,
    Outbound, Role,
};
use roster_protocol::{
    Codec, ConnectionId, Envelope, MembershipMessage, PlayerRecord,
};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::RosterError;
use crate::events::{EventHub, EventStream};

/// Frames that may queue for one connection before it counts as stalled.
pub(crate) const LINK_CAPACITY: usize = 256;

/// Channel feeding one connection's writer task with encoded frames.
pub(crate) type LinkSender = mpsc::Sender<Vec<u8>>;

/// Commands sent to a node through its channel.
///
/// The `oneshot::Sender` in the query variants is a reply channel: the
/// caller sends the command and waits for the answer on it.
pub(crate) enum Command {
    /// Server: a remote connection was accepted; frames for it go to `link`.
    Attach { id: ConnectionId, link: LinkSender },

    /// This process's own participant is connected under `id`.
    Established(ConnectionId),

    /// A connection went away.
    Lost(ConnectionId),

    /// A membership message arrived from connection `from`.
    Inbound {
        from: ConnectionId,
        message: MembershipMessage,
    },

    Count {
        reply: oneshot::Sender<usize>,
    },
    IdAt {
        index: usize,
        reply: oneshot::Sender<Result<ConnectionId, MembershipError>>,
    },
    RecordOf {
        id: ConnectionId,
        reply: oneshot::Sender<Result<PlayerRecord, MembershipError>>,
    },
    Players {
        reply: oneshot::Sender<Vec<(ConnectionId, PlayerRecord)>>,
    },
    LocalId {
        reply: oneshot::Sender<Option<ConnectionId>>,
    },

    /// Stop the node.
    Shutdown,
}

/// Where a node's outbound frames go.
pub(crate) enum Links {
    /// One writer per accepted connection.
    Server {
        peers: HashMap<ConnectionId, LinkSender>,
    },
    /// The single connection to the server.
    Client { server: LinkSender },
}

// ---------------------------------------------------------------------------
// MembershipHandle
// ---------------------------------------------------------------------------

/// Handle to a running membership node. Cheap to clone.
///
/// Queries are answered by the node itself, in order with every protocol
/// message it has already received.
#[derive(Clone)]
pub struct MembershipHandle {
    sender: mpsc::Sender<Command>,
    events: EventHub,
}

impl MembershipHandle {
    pub(crate) async fn send(&self, cmd: Command) -> Result<(), RosterError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RosterError::NodeUnavailable)
    }

    async fn ask<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RosterError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx)).await?;
        reply_rx.await.map_err(|_| RosterError::NodeUnavailable)
    }

    /// Subscribes to membership events raised after this call.
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Number of players in this process's view.
    pub async fn count(&self) -> Result<usize, RosterError> {
        self.ask(|reply| Command::Count { reply }).await
    }

    /// The `index`-th registered player in join order. Server only.
    pub async fn id_at(&self, index: usize) -> Result<ConnectionId, RosterError> {
        Ok(self.ask(|reply| Command::IdAt { index, reply }).await??)
    }

    /// The record a player joined with.
    pub async fn record_of(
        &self,
        id: ConnectionId,
    ) -> Result<PlayerRecord, RosterError> {
        Ok(self.ask(|reply| Command::RecordOf { id, reply }).await??)
    }

    /// Every player in this process's view, sorted by id.
    pub async fn players(
        &self,
    ) -> Result<Vec<(ConnectionId, PlayerRecord)>, RosterError> {
        self.ask(|reply| Command::Players { reply }).await
    }

    /// This process's own connection id, once the transport has told it.
    pub async fn local_id(&self) -> Result<Option<ConnectionId>, RosterError> {
        self.ask(|reply| Command::LocalId { reply }).await
    }

    /// Tells the node to stop.
    pub async fn shutdown(&self) -> Result<(), RosterError> {
        self.send(Command::Shutdown).await
    }

    /// Returns `true` while the node is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Completes once the node has stopped.
    pub async fn stopped(&self) {
        self.sender.closed().await;
    }

    pub(crate) async fn attach(
        &self,
        id: ConnectionId,
        link: LinkSender,
    ) -> Result<(), RosterError> {
        self.send(Command::Attach { id, link }).await
    }

    pub(crate) async fn established(
        &self,
        id: ConnectionId,
    ) -> Result<(), RosterError> {
        self.send(Command::Established(id)).await
    }

    pub(crate) async fn lost(&self, id: ConnectionId) -> Result<(), RosterError> {
        self.send(Command::Lost(id)).await
    }

    pub(crate) async fn inbound(
        &self,
        from: ConnectionId,
        message: MembershipMessage,
    ) -> Result<(), RosterError> {
        self.send(Command::Inbound { from, message }).await
    }
}

// ---------------------------------------------------------------------------
// Node actor
// ---------------------------------------------------------------------------

struct Node<C: Codec> {
    coordinator: MembershipCoordinator<C>,
    links: Links,
    codec: C,
    loopback: VecDeque<MembershipMessage>,
    receiver: mpsc::Receiver<Command>,
}

impl<C: Codec> Node<C> {
    /// Runs the node loop, processing commands until shutdown.
    async fn run(mut self) {
        let role = self.coordinator.role();
        tracing::info!(%role, "membership node started");

        while let Some(cmd) = self.receiver.recv().await {
            if !self.handle(cmd) {
                break;
            }
            self.drain_loopback();
        }

        tracing::info!(%role, "membership node stopped");
    }

    /// Handles one command. Returns `false` when the node should stop.
    fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Attach { id, link } => {
                match &mut self.links {
                    Links::Server { peers } => {
                        peers.insert(id, link);
                    }
                    Links::Client { .. } => {
                        tracing::warn!(connection_id = %id, "attach on a client node, ignoring");
                        return true;
                    }
                }
                self.established(id);
            }
            Command::Established(id) => self.established(id),
            Command::Lost(id) => return self.lost(id),
            Command::Inbound { from, message } => self.inbound(from, message),
            Command::Count { reply } => {
                let _ = reply.send(self.coordinator.count());
            }
            Command::IdAt { index, reply } => {
                let _ = reply.send(self.coordinator.id_at(index));
            }
            Command::RecordOf { id, reply } => {
                let _ = reply.send(self.coordinator.record_of(id).cloned());
            }
            Command::Players { reply } => {
                let view = self.coordinator.view();
                let players = view
                    .ids()
                    .into_iter()
                    .filter_map(|id| view.get(id).map(|r| (id, r.clone())))
                    .collect();
                let _ = reply.send(players);
            }
            Command::LocalId { reply } => {
                let _ = reply.send(self.coordinator.local_id());
            }
            Command::Shutdown => {
                tracing::info!("membership node shutting down");
                return false;
            }
        }
        true
    }

    fn established(&mut self, id: ConnectionId) {
        match self.coordinator.connection_established(id) {
            Ok(out) => self.deliver(out),
            Err(e) => {
                tracing::error!(connection_id = %id, error = %e, "could not send join request");
            }
        }
    }

    fn lost(&mut self, id: ConnectionId) -> bool {
        if let Links::Server { peers } = &mut self.links {
            // Dropping the sender ends that connection's writer task.
            peers.remove(&id);
        }
        let out = self.coordinator.connection_lost(id);
        self.deliver(out);

        // A client only has the one link; without it the session is over.
        self.coordinator.role() == Role::Server
    }

    fn inbound(&mut self, from: ConnectionId, message: MembershipMessage) {
        if let Links::Server { .. } = self.links {
            match &message {
                MembershipMessage::JoinRequest { connection_id, .. }
                    if *connection_id != from =>
                {
                    tracing::warn!(
                        %from,
                        claimed = %connection_id,
                        "join request for another connection, ignoring"
                    );
                    return;
                }
                MembershipMessage::JoinRequest { .. } => {}
                other => {
                    tracing::warn!(
                        %from,
                        kind = other.kind(),
                        "broadcast sent by a participant, ignoring"
                    );
                    return;
                }
            }
        }
        self.apply(message);
    }

    fn apply(&mut self, message: MembershipMessage) {
        let kind = message.kind();
        match self.coordinator.handle_message(message) {
            Ok(out) => self.deliver(out),
            Err(e) => {
                tracing::warn!(kind, error = %e, "membership message rejected");
            }
        }
    }

    fn drain_loopback(&mut self) {
        while let Some(message) = self.loopback.pop_front() {
            self.apply(message);
        }
    }

    /// Routes outbound messages. Anything a server addresses to the server
    /// or to all clients is also looped back into its own coordinator.
    fn deliver(&mut self, out: Vec<Outbound>) {
        for Outbound {
            destination,
            message,
        } in out
        {
            match (&self.links, destination) {
                (Links::Server { .. }, Destination::Server) => {
                    self.loopback.push_back(message);
                }
                (Links::Server { .. }, Destination::AllClients) => {
                    if let Some(frame) = self.encode(&message) {
                        self.fan_out(&frame);
                    }
                    self.loopback.push_back(message);
                }
                (Links::Client { server }, Destination::Server) => {
                    if let Some(frame) = self.encode(&message) {
                        if let Err(e) = server.try_send(frame) {
                            tracing::warn!(
                                kind = message.kind(),
                                error = %e,
                                "server link unavailable, dropping frame"
                            );
                        }
                    }
                }
                (Links::Client { .. }, Destination::AllClients) => {
                    tracing::warn!(
                        kind = message.kind(),
                        "client cannot broadcast, dropping"
                    );
                }
            }
        }
    }

    /// Queues `frame` on every peer link. A peer whose queue is full is
    /// detached: dropping its link closes the socket, and the reader's
    /// loss report then removes it like any other disconnect.
    fn fan_out(&mut self, frame: &[u8]) {
        let Links::Server { peers } = &mut self.links else {
            return;
        };
        peers.retain(|id, link| match link.try_send(frame.to_vec()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %id, "peer stalled, dropping its link");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    fn encode(&self, message: &MembershipMessage) -> Option<Vec<u8>> {
        match self.codec.encode(&Envelope::Membership(message.clone())) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::error!(kind = message.kind(), error = %e, "failed to encode frame");
                None
            }
        }
    }
}

/// Spawns a node task and returns a handle to communicate with it.
///
/// Events raised by the coordinator are published to `events`; callers
/// that subscribed before this call see every event from the start.
pub(crate) fn spawn_node<C: Codec>(
    mut coordinator: MembershipCoordinator<C>,
    links: Links,
    codec: C,
    channel_size: usize,
    events: EventHub,
) -> MembershipHandle {
    let (tx, rx) = mpsc::channel(channel_size);

    let hub = events.clone();
    coordinator.register_listener(move |event: &MembershipEvent| hub.publish(*event));

    let node = Node {
        coordinator,
        links,
        codec,
        loopback: VecDeque::new(),
        receiver: rx,
    };
    tokio::spawn(node.run());

    MembershipHandle { sender: tx, events }
}
