//! Transport abstraction layer for Roster.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the network substrate, plus the [`ConnectionId`] handle that the
//! membership protocol uses as participant identity.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a connection.
///
/// Supplied by the transport and unique per connected participant for the
/// lifetime of that connection. Serializes as a plain number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// The id a server process uses for its own local participant.
    /// Accepted connections are numbered from 1, so this never collides.
    pub const HOST: ConnectionId = ConnectionId(0);

    /// Creates a new `ConnectionId` from a raw `u64`.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A single connection that can send and receive bytes.
///
/// Sending and receiving may happen concurrently from different tasks:
/// a reader loop can be parked in [`recv`](Connection::recv) while a
/// writer task calls [`send`](Connection::send).
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends data to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_host_is_zero() {
        assert_eq!(ConnectionId::HOST.into_inner(), 0);
        assert_eq!(ConnectionId::HOST.to_string(), "conn-0");
    }

    #[test]
    fn test_connection_id_serializes_as_plain_number() {
        // Peers on the wire see `3`, not `{"0":3}`.
        let json = serde_json::to_string(&ConnectionId::new(3)).unwrap();
        assert_eq!(json, "3");

        let id: ConnectionId = serde_json::from_str("3").unwrap();
        assert_eq!(id, ConnectionId::new(3));
    }

    #[test]
    fn test_connection_id_orders_by_value() {
        let mut ids = vec![ConnectionId::new(5), ConnectionId::new(1), ConnectionId::new(3)];
        ids.sort();
        assert_eq!(
            ids,
            vec![ConnectionId::new(1), ConnectionId::new(3), ConnectionId::new(5)]
        );
    }
}
