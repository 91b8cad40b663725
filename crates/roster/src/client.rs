//! `RosterClient`: a participant that joins someone else's server.

use std::sync::Arc;
use std::time::Duration;

use roster_membership::{
    InstanceSlot, KeepRunning, MembershipCoordinator, TerminationPolicy,
};
use roster_protocol::{
    Codec, ConnectionId, Envelope, JsonCodec, PlayerRecord, SystemMessage,
};
use roster_transport::{Connection, WebSocketConnection};

use crate::RosterError;
use crate::events::{EventHub, EventStream};
use crate::handler::{LinkGuard, read_loop, spawn_writer};
use crate::node::{Links, MembershipHandle, spawn_node};
use crate::server::DEFAULT_CHANNEL_SIZE;

/// How long the server has to send its `Welcome`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for connecting to a Roster server.
///
/// # Example
///
/// ```rust,no_run
/// use roster::prelude::*;
///
/// # async fn demo() -> Result<(), RosterError> {
/// let client = RosterClient::builder(PlayerRecord::new("Alice"))
///     .connect("127.0.0.1:7777")
///     .await?;
/// println!("joined as {}", client.connection_id());
/// # Ok(())
/// # }
/// ```
pub struct RosterClientBuilder<C: Codec = JsonCodec> {
    local_record: PlayerRecord,
    channel_size: usize,
    termination: Arc<dyn TerminationPolicy>,
    slot: Option<InstanceSlot>,
    codec: C,
    events: EventHub,
}

impl RosterClientBuilder {
    /// Creates a builder that will publish `local_record` once connected.
    pub fn new(local_record: PlayerRecord) -> Self {
        Self {
            local_record,
            channel_size: DEFAULT_CHANNEL_SIZE,
            termination: Arc::new(KeepRunning),
            slot: None,
            codec: JsonCodec,
            events: EventHub::new(),
        }
    }
}

impl<C: Codec + Clone> RosterClientBuilder<C> {
    /// Sets the capacity of the node's command queue.
    pub fn channel_size(mut self, size: usize) -> Self {
        self.channel_size = size.max(1);
        self
    }

    /// Sets what happens when a member is lost (default: [`KeepRunning`]).
    pub fn termination_policy(
        mut self,
        policy: impl TerminationPolicy,
    ) -> Self {
        self.termination = Arc::new(policy);
        self
    }

    /// Uses `slot` to guard against a second live coordinator.
    pub fn instance_slot(mut self, slot: InstanceSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Swaps the wire codec. Must match the server's.
    pub fn codec<D: Codec + Clone>(self, codec: D) -> RosterClientBuilder<D> {
        RosterClientBuilder {
            local_record: self.local_record,
            channel_size: self.channel_size,
            termination: self.termination,
            slot: self.slot,
            codec,
            events: self.events,
        }
    }

    /// Subscribes to membership events. Receivers created here see every
    /// event from the first broadcast on.
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Connects to the server at `addr`, waits for its `Welcome`, and
    /// sends this participant's join request.
    pub async fn connect(self, addr: &str) -> Result<RosterClient<C>, RosterError> {
        let guard = self.slot.unwrap_or_default().claim()?;
        let conn = WebSocketConnection::connect(addr).await?;
        let connection_id = await_welcome(&conn, &self.codec).await?;
        tracing::info!(%connection_id, addr, "welcomed by server");

        let conn = Arc::new(conn);
        let server = spawn_writer(Arc::clone(&conn));

        let coordinator =
            MembershipCoordinator::client(guard, self.local_record, self.codec.clone())
                .with_termination_policy(self.termination);
        let handle = spawn_node(
            coordinator,
            Links::Client { server },
            self.codec.clone(),
            self.channel_size,
            self.events,
        );
        handle.established(connection_id).await?;

        let reader_conn = Arc::clone(&conn);
        let reader_node = handle.clone();
        let codec = self.codec.clone();
        tokio::spawn(async move {
            let _guard = LinkGuard::new(ConnectionId::HOST, reader_node.clone());
            read_loop(&reader_conn, &codec, &reader_node, ConnectionId::HOST)
                .await;
        });

        Ok(RosterClient {
            conn,
            handle,
            codec: self.codec,
            connection_id,
        })
    }
}

/// Reads the first frame, which must be a `Welcome`.
async fn await_welcome<C: Codec>(
    conn: &WebSocketConnection,
    codec: &C,
) -> Result<ConnectionId, RosterError> {
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(RosterError::Handshake(
                "connection closed before welcome".into(),
            ));
        }
        Ok(Err(e)) => return Err(RosterError::Transport(e)),
        Err(_) => {
            return Err(RosterError::Handshake("welcome timed out".into()));
        }
    };

    match codec.decode::<Envelope>(&data)? {
        Envelope::System(SystemMessage::Welcome { connection_id }) => {
            Ok(connection_id)
        }
        other => Err(RosterError::Handshake(format!(
            "expected Welcome, got {other:?}"
        ))),
    }
}

/// A connected participant.
///
/// Dropping the client leaves its tasks running until the server closes
/// the connection; call [`disconnect`](Self::disconnect) to leave cleanly.
pub struct RosterClient<C: Codec = JsonCodec> {
    conn: Arc<WebSocketConnection>,
    handle: MembershipHandle,
    codec: C,
    connection_id: ConnectionId,
}

impl RosterClient {
    /// Creates a builder that will publish `local_record`.
    pub fn builder(local_record: PlayerRecord) -> RosterClientBuilder {
        RosterClientBuilder::new(local_record)
    }
}

impl<C: Codec> RosterClient<C> {
    /// This participant's connection id, as assigned by the server.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Returns a handle for querying the membership node.
    pub fn handle(&self) -> MembershipHandle {
        self.handle.clone()
    }

    /// Subscribes to membership events raised after this call.
    pub fn subscribe(&self) -> EventStream {
        self.handle.subscribe()
    }

    /// Tells the server this participant is leaving, then closes the
    /// connection. The server broadcasts the leave to everyone else.
    pub async fn disconnect(self, reason: &str) -> Result<(), RosterError> {
        let bye = self.codec.encode(&Envelope::from(SystemMessage::Disconnect {
            reason: reason.to_string(),
        }))?;
        self.conn.send(&bye).await?;
        self.conn.close().await?;
        tracing::info!(connection_id = %self.connection_id, reason, "disconnected");
        Ok(())
    }
}
