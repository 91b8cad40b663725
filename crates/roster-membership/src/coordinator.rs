//! The membership coordinator: the join/leave protocol state machine.
//!
//! One coordinator runs in every process. Its role decides which half of
//! the protocol it plays:
//!
//! ```text
//!            participant                      server
//!  connection_established(id)
//!      ── JoinRequest(id, record) ──→  handle_join_request
//!                                        registry.insert
//!      ←── JoinBroadcast(all ids, all records) ──  (to everyone, incl. itself)
//!  apply_join_broadcast
//!      view.insert + PlayerAdded
//!
//!                                     connection_lost(id)
//!      ←── LeaveBroadcast(id) ──             registry.remove
//!  apply_leave
//!      view.remove + PlayerRemoved
//! ```
//!
//! The coordinator does no I/O. Handlers return [`Outbound`] messages and
//! the caller delivers them. A server-role caller must also deliver its
//! own `Server`-addressed and `AllClients`-addressed messages back to this
//! coordinator, so the host's participant travels the same path as every
//! remote one.
//!
//! All methods take `&mut self`: the owner feeds events one at a time, and
//! that sequencing is what keeps join and leave processing from
//! interleaving.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use roster_protocol::{
    Codec, ConnectionId, EncodedRecord, JsonCodec, MembershipMessage,
    PlayerRecord, ProtocolError,
};

use crate::events::Listeners;
use crate::{
    ClientView, InstanceGuard, KeepRunning, ListenerId, MembershipError,
    MembershipEvent, ServerRegistry, TerminationPolicy,
};

// ---------------------------------------------------------------------------
// Public helper types
// ---------------------------------------------------------------------------

/// Which half of the protocol a coordinator plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Authoritative: owns the registry and answers join requests.
    Server,
    /// Replica: only applies broadcasts.
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// Where a participant stands in the join handshake, as seen locally.
///
/// ```text
/// Connecting ─→ AwaitingBroadcast ─→ Registered     (own participant)
/// Connecting ─→ AwaitingJoinAck ───→ Registered     (server's view of a remote)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPhase {
    /// No connection-established signal yet.
    Connecting,
    /// Server side: connected, join request not yet received.
    AwaitingJoinAck,
    /// Own participant: join request sent, not yet seen in a broadcast.
    AwaitingBroadcast,
    /// Fully joined.
    Registered,
}

/// Who an outbound message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// The authoritative server (possibly this very process).
    Server,
    /// Every connected participant, this process included.
    AllClients,
}

/// A message the caller must deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub destination: Destination,
    pub message: MembershipMessage,
}

impl Outbound {
    fn to_server(message: MembershipMessage) -> Self {
        Self {
            destination: Destination::Server,
            message,
        }
    }

    fn to_all(message: MembershipMessage) -> Self {
        Self {
            destination: Destination::AllClients,
            message,
        }
    }
}

/// What applying one join broadcast did to the local view.
#[derive(Debug, Default)]
pub struct JoinReport {
    /// Ids newly added, in broadcast order.
    pub added: Vec<ConnectionId>,
    /// Ids that were already present and skipped.
    pub already_present: usize,
    /// Entries whose record failed to decode. Every other entry was still
    /// applied.
    pub rejected: Vec<(ConnectionId, ProtocolError)>,
}

// ---------------------------------------------------------------------------
// MembershipCoordinator
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum RoleState {
    Server {
        host_id: ConnectionId,
        registry: ServerRegistry,
        /// Connected remotes whose join request hasn't arrived yet.
        pending: HashSet<ConnectionId>,
    },
    Client,
}

/// Runs the membership protocol for one process.
///
/// Build one with [`server`](Self::server) or [`client`](Self::client);
/// both require an [`InstanceGuard`], so a second live coordinator for the
/// same slot cannot be constructed.
pub struct MembershipCoordinator<C: Codec = JsonCodec> {
    role: RoleState,
    local_record: PlayerRecord,
    local_id: Option<ConnectionId>,
    local_phase: JoinPhase,
    view: ClientView,
    listeners: Listeners,
    termination: Arc<dyn TerminationPolicy>,
    codec: C,
    _guard: InstanceGuard,
}

impl<C: Codec> MembershipCoordinator<C> {
    /// Creates the authoritative coordinator.
    ///
    /// `host_id` is the connection id of the server's own participant;
    /// its join goes through [`connection_established`](Self::connection_established)
    /// like anyone else's.
    pub fn server(
        guard: InstanceGuard,
        host_id: ConnectionId,
        local_record: PlayerRecord,
        codec: C,
    ) -> Self {
        Self::with_role(
            RoleState::Server {
                host_id,
                registry: ServerRegistry::new(),
                pending: HashSet::new(),
            },
            Some(host_id),
            guard,
            local_record,
            codec,
        )
    }

    /// Creates a replica coordinator. Its own id is learned from the
    /// first connection-established signal.
    pub fn client(
        guard: InstanceGuard,
        local_record: PlayerRecord,
        codec: C,
    ) -> Self {
        Self::with_role(RoleState::Client, None, guard, local_record, codec)
    }

    fn with_role(
        role: RoleState,
        local_id: Option<ConnectionId>,
        guard: InstanceGuard,
        local_record: PlayerRecord,
        codec: C,
    ) -> Self {
        Self {
            role,
            local_record,
            local_id,
            local_phase: JoinPhase::Connecting,
            view: ClientView::new(),
            listeners: Listeners::default(),
            termination: Arc::new(KeepRunning),
            codec,
            _guard: guard,
        }
    }

    /// Replaces the termination policy (default: [`KeepRunning`]).
    pub fn with_termination_policy(
        mut self,
        policy: Arc<dyn TerminationPolicy>,
    ) -> Self {
        self.termination = policy;
        self
    }

    // -- Listeners --------------------------------------------------------

    /// Registers a callback for membership events. Callbacks run
    /// synchronously, in registration order, inside the handler that
    /// caused the event.
    pub fn register_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&MembershipEvent) + Send + 'static,
    {
        self.listeners.register(Box::new(listener))
    }

    /// Removes a callback. Returns `false` if it was not registered.
    pub fn unregister_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    // -- Transport signals ------------------------------------------------

    /// The transport reports that connection `id` is up.
    ///
    /// If `id` is this process's own participant, its record is encoded
    /// and a join request is addressed to the server, even when this
    /// process is the server. A server seeing some other connection just
    /// waits for that connection's own join request.
    pub fn connection_established(
        &mut self,
        id: ConnectionId,
    ) -> Result<Vec<Outbound>, MembershipError> {
        let is_own = match &self.role {
            RoleState::Server { host_id, .. } => id == *host_id,
            RoleState::Client => true,
        };

        if !is_own {
            if let RoleState::Server {
                registry, pending, ..
            } = &mut self.role
            {
                if !registry.contains(id) {
                    pending.insert(id);
                }
            }
            tracing::info!(connection_id = %id, "player connected, awaiting join request");
            return Ok(Vec::new());
        }

        let record = self.codec.encode_record(&self.local_record)?;
        self.local_id = Some(id);
        self.local_phase = JoinPhase::AwaitingBroadcast;
        tracing::debug!(connection_id = %id, role = %self.role(), "sending join request");

        Ok(vec![Outbound::to_server(MembershipMessage::JoinRequest {
            connection_id: id,
            record,
        })])
    }

    /// The transport reports that connection `id` is gone.
    ///
    /// On the server this addresses a leave broadcast to everyone still
    /// connected and drops `id` from the registry, both within this call.
    /// On a client the only connection is the one to the server, so losing
    /// it ends the session; nothing is sent.
    pub fn connection_lost(&mut self, id: ConnectionId) -> Vec<Outbound> {
        match &mut self.role {
            RoleState::Server {
                registry, pending, ..
            } => {
                let leave = Outbound::to_all(MembershipMessage::LeaveBroadcast {
                    connection_id: id,
                });
                pending.remove(&id);
                let was_registered = registry.remove(id).is_some();
                tracing::info!(
                    connection_id = %id,
                    was_registered,
                    players = registry.len(),
                    "player left"
                );
                vec![leave]
            }
            RoleState::Client => {
                tracing::info!(connection_id = %id, "lost connection to server, session ended");
                self.local_phase = JoinPhase::Connecting;
                Vec::new()
            }
        }
    }

    // -- Protocol messages ------------------------------------------------

    /// Dispatches one received membership message.
    ///
    /// Per-entry decode failures inside a join broadcast are logged and
    /// skipped; use [`apply_join_broadcast`](Self::apply_join_broadcast)
    /// directly to inspect them.
    pub fn handle_message(
        &mut self,
        message: MembershipMessage,
    ) -> Result<Vec<Outbound>, MembershipError> {
        match message {
            MembershipMessage::JoinRequest {
                connection_id,
                record,
            } => self.handle_join_request(connection_id, record),
            MembershipMessage::JoinBroadcast { ids, records } => {
                self.apply_join_broadcast(ids, records)?;
                Ok(Vec::new())
            }
            MembershipMessage::LeaveBroadcast { connection_id } => {
                self.apply_leave(connection_id);
                Ok(Vec::new())
            }
        }
    }

    /// Server side of a join: register `id` and broadcast the full registry.
    ///
    /// A request for an id that is already registered is treated as a
    /// retransmission of a join that already completed: nothing changes and
    /// nothing is sent. The record must decode; a malformed one is refused
    /// so it can never reach the other participants.
    ///
    /// On a client-role coordinator the request is ignored: only the server
    /// may touch the registry.
    pub fn handle_join_request(
        &mut self,
        id: ConnectionId,
        record: EncodedRecord,
    ) -> Result<Vec<Outbound>, MembershipError> {
        let RoleState::Server {
            registry, pending, ..
        } = &mut self.role
        else {
            tracing::warn!(connection_id = %id, "join request reached a client, ignoring");
            return Ok(Vec::new());
        };

        if registry.contains(id) {
            tracing::debug!(connection_id = %id, "duplicate join request, ignoring");
            return Ok(Vec::new());
        }

        let decoded = self.codec.decode_record(&record)?;
        registry.insert(id, record);
        pending.remove(&id);
        tracing::info!(
            connection_id = %id,
            name = %decoded.display_name,
            players = registry.len(),
            "player registered"
        );

        let (ids, records) = registry.snapshot();
        Ok(vec![Outbound::to_all(MembershipMessage::JoinBroadcast {
            ids,
            records,
        })])
    }

    /// Merges a join broadcast into the local view.
    ///
    /// Entries whose id is already present are skipped without decoding,
    /// so applying the same or an older snapshot again changes nothing and
    /// raises no events. Each entry is decoded on its own; a bad one is
    /// reported in [`JoinReport::rejected`] and the rest still apply.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] (wrapped) if the id and
    /// record sequences differ in length; nothing is applied in that case.
    pub fn apply_join_broadcast(
        &mut self,
        ids: Vec<ConnectionId>,
        records: Vec<EncodedRecord>,
    ) -> Result<JoinReport, MembershipError> {
        if ids.len() != records.len() {
            return Err(ProtocolError::InvalidMessage(format!(
                "join broadcast has {} ids but {} records",
                ids.len(),
                records.len()
            ))
            .into());
        }

        let mut report = JoinReport::default();
        for (id, encoded) in ids.into_iter().zip(records) {
            if self.view.contains(id) {
                report.already_present += 1;
                continue;
            }
            match self.codec.decode_record(&encoded) {
                Ok(record) => {
                    tracing::info!(
                        connection_id = %id,
                        name = %record.display_name,
                        "player added"
                    );
                    self.view.insert_if_absent(id, record);
                    if self.local_id == Some(id) {
                        self.local_phase = JoinPhase::Registered;
                    }
                    self.listeners.emit(MembershipEvent::PlayerAdded(id));
                    report.added.push(id);
                }
                Err(e) => {
                    tracing::warn!(
                        connection_id = %id,
                        error = %e,
                        "skipping malformed record in join broadcast"
                    );
                    report.rejected.push((id, e));
                }
            }
        }

        Ok(report)
    }

    /// Applies a leave broadcast: notify the termination policy, then drop
    /// `id` from the view. Returns `true` if a player was removed.
    ///
    /// The policy runs even when `id` was never in the view; only the
    /// removal and its event are skipped for an absent id.
    pub fn apply_leave(&mut self, id: ConnectionId) -> bool {
        self.termination.on_member_lost(id);

        if self.view.remove(id).is_none() {
            tracing::debug!(connection_id = %id, "leave for unknown player, ignoring");
            return false;
        }

        tracing::info!(connection_id = %id, players = self.view.len(), "player removed");
        self.listeners.emit(MembershipEvent::PlayerRemoved(id));
        true
    }

    // -- Queries ----------------------------------------------------------

    /// Number of players in the local view.
    pub fn count(&self) -> usize {
        self.view.len()
    }

    /// The `index`-th registered id in join order. Server role only.
    pub fn id_at(&self, index: usize) -> Result<ConnectionId, MembershipError> {
        self.registry()
            .ok_or(MembershipError::NotServer)?
            .id_at(index)
    }

    /// The record of a player in the local view.
    pub fn record_of(
        &self,
        id: ConnectionId,
    ) -> Result<&PlayerRecord, MembershipError> {
        self.view.get(id).ok_or(MembershipError::NotFound(id))
    }

    /// Returns `true` if the player is in the local view.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.view.contains(id)
    }

    /// Ids in the local view, sorted ascending.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.view.ids()
    }

    /// Read-only access to the local view.
    pub fn view(&self) -> &ClientView {
        &self.view
    }

    /// Read-only access to the registry; `None` on a client.
    pub fn registry(&self) -> Option<&ServerRegistry> {
        match &self.role {
            RoleState::Server { registry, .. } => Some(registry),
            RoleState::Client => None,
        }
    }

    /// This process's role.
    pub fn role(&self) -> Role {
        match self.role {
            RoleState::Server { .. } => Role::Server,
            RoleState::Client => Role::Client,
        }
    }

    /// This process's own connection id, once known.
    pub fn local_id(&self) -> Option<ConnectionId> {
        self.local_id
    }

    /// The record this process joins with.
    pub fn local_record(&self) -> &PlayerRecord {
        &self.local_record
    }

    /// Join phase of this process's own participant.
    pub fn local_phase(&self) -> JoinPhase {
        self.local_phase
    }

    /// Join phase of any participant this process knows about.
    pub fn phase(&self, id: ConnectionId) -> Option<JoinPhase> {
        if self.local_id == Some(id) {
            return Some(self.local_phase);
        }
        match &self.role {
            RoleState::Server {
                registry, pending, ..
            } => {
                if registry.contains(id) {
                    Some(JoinPhase::Registered)
                } else if pending.contains(&id) {
                    Some(JoinPhase::AwaitingJoinAck)
                } else {
                    None
                }
            }
            RoleState::Client => {
                self.view.contains(id).then_some(JoinPhase::Registered)
            }
        }
    }
}

impl<C: Codec> fmt::Debug for MembershipCoordinator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MembershipCoordinator")
            .field("role", &self.role())
            .field("local_id", &self.local_id)
            .field("local_phase", &self.local_phase)
            .field("players", &self.view.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// =========================================================================
// Tests
// =========================================================================
