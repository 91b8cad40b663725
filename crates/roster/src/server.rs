//! `RosterServer` builder and accept loop.
//!
//! The server process is also a participant: it owns the authoritative
//! coordinator, and its own player (the host) joins through the same
//! request/broadcast path as every remote one.

use std::collections::HashMap;
use std::sync::Arc;

use roster_membership::{
    InstanceSlot, KeepRunning, MembershipCoordinator, TerminationPolicy,
};
use roster_protocol::{Codec, ConnectionId, JsonCodec, PlayerRecord};
use roster_transport::{Transport, WebSocketTransport};

use crate::RosterError;
use crate::events::{EventHub, EventStream};
use crate::handler::handle_connection;
use crate::node::{Links, MembershipHandle, spawn_node};

/// Default address the server binds to.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7777";

/// Default capacity of the node's command queue.
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Builder for configuring and starting a Roster server.
///
/// # Example
///
/// ```rust,no_run
/// use roster::prelude::*;
///
/// # async fn demo() -> Result<(), RosterError> {
/// let server = RosterServer::builder()
///     .bind("0.0.0.0:7777")
///     .local_record(PlayerRecord::new("Host").with_attribute("color", "red"))
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct RosterServerBuilder<C: Codec = JsonCodec> {
    bind_addr: String,
    host_id: ConnectionId,
    local_record: PlayerRecord,
    channel_size: usize,
    termination: Arc<dyn TerminationPolicy>,
    slot: Option<InstanceSlot>,
    codec: C,
    events: EventHub,
}

impl RosterServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            host_id: ConnectionId::HOST,
            local_record: PlayerRecord::new("host"),
            channel_size: DEFAULT_CHANNEL_SIZE,
            termination: Arc::new(KeepRunning),
            slot: None,
            codec: JsonCodec,
            events: EventHub::new(),
        }
    }
}

impl Default for RosterServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec + Clone> RosterServerBuilder<C> {
    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the connection id of the host's own player. The transport
    /// never hands this id to an accepted connection.
    pub fn host_id(mut self, id: ConnectionId) -> Self {
        self.host_id = id;
        self
    }

    /// Sets the record the host publishes about itself.
    pub fn local_record(mut self, record: PlayerRecord) -> Self {
        self.local_record = record;
        self
    }

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

    /// Uses `slot` to guard against a second live coordinator. Without
    /// one, the server gets a private slot.
    pub fn instance_slot(mut self, slot: InstanceSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Swaps the wire codec.
    pub fn codec<D: Codec + Clone>(self, codec: D) -> RosterServerBuilder<D> {
        RosterServerBuilder {
            bind_addr: self.bind_addr,
            host_id: self.host_id,
            local_record: self.local_record,
            channel_size: self.channel_size,
            termination: self.termination,
            slot: self.slot,
            codec,
            events: self.events,
        }
    }

    /// Subscribes to membership events. Receivers created here see every
    /// event, including the host's own join.
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Claims the instance slot, binds the listener, and starts the node.
    ///
    /// The host does not join until [`RosterServer::run`] is called.
    pub async fn build(self) -> Result<RosterServer<C>, RosterError> {
        let guard = self.slot.unwrap_or_default().claim()?;
        let mut transport = WebSocketTransport::bind(&self.bind_addr).await?;
        transport.reserve(self.host_id);

        let coordinator = MembershipCoordinator::server(
            guard,
            self.host_id,
            self.local_record,
            self.codec.clone(),
        )
        .with_termination_policy(self.termination);

        let handle = spawn_node(
            coordinator,
            Links::Server {
                peers: HashMap::new(),
            },
            self.codec.clone(),
            self.channel_size,
            self.events,
        );

        Ok(RosterServer {
            transport,
            handle,
            codec: self.codec,
            host_id: self.host_id,
        })
    }
}

/// A bound Roster server.
///
/// Call [`run()`](Self::run) to register the host and start accepting
/// connections.
pub struct RosterServer<C: Codec = JsonCodec> {
    transport: WebSocketTransport,
    handle: MembershipHandle,
    codec: C,
    host_id: ConnectionId,
}

impl RosterServer {
    /// Creates a new builder.
    pub fn builder() -> RosterServerBuilder {
        RosterServerBuilder::new()
    }
}

impl<C: Codec + Clone> RosterServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns a handle for querying the membership node.
    pub fn handle(&self) -> MembershipHandle {
        self.handle.clone()
    }

    /// Subscribes to membership events raised after this call.
    pub fn subscribe(&self) -> EventStream {
        self.handle.subscribe()
    }

    /// Runs the server.
    ///
    /// Registers the host, then accepts connections and spawns a handler
    /// task for each. Returns once the node has been shut down through
    /// [`MembershipHandle::shutdown`].
    pub async fn run(mut self) -> Result<(), RosterError> {
        tracing::info!(host_id = %self.host_id, "Roster server running");
        self.handle.established(self.host_id).await?;

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let node = self.handle.clone();
                        let codec = self.codec.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, node, codec).await {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                () = self.handle.stopped() => break,
            }
        }

        self.transport.shutdown().await?;
        tracing::info!("Roster server stopped");
        Ok(())
    }
}
