//! Per-connection plumbing between a WebSocket and a membership node.
//!
//! Each connection gets two tasks:
//!   1. a writer draining the node's link channel into the socket
//!   2. a reader decoding envelopes and forwarding them to the node
//!
//! The writer ends when the node drops the link (connection lost, node
//! stopped, or the peer fell `LINK_CAPACITY` frames behind); the reader
//! ends on close, error, or a `Disconnect` frame.

use std::sync::Arc;

use roster_protocol::{Codec, ConnectionId, Envelope, SystemMessage};
use roster_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::RosterError;
use crate::node::{LINK_CAPACITY, LinkSender, MembershipHandle};

/// Drop guard that reports the connection lost when the reader exits.
///
/// This ensures the node hears about it even if the handler panics. Since
/// `Drop` is synchronous, we spawn a fire-and-forget task for the send.
pub(crate) struct LinkGuard {
    connection_id: ConnectionId,
    node: MembershipHandle,
}

impl LinkGuard {
    pub(crate) fn new(connection_id: ConnectionId, node: MembershipHandle) -> Self {
        Self {
            connection_id,
            node,
        }
    }
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        let connection_id = self.connection_id;
        let node = self.node.clone();
        tokio::spawn(async move {
            // The node may already be gone.
            let _ = node.lost(connection_id).await;
        });
    }
}

/// Spawns the writer task for `conn` and returns the link feeding it.
pub(crate) fn spawn_writer(conn: Arc<WebSocketConnection>) -> LinkSender {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(LINK_CAPACITY);
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = conn.send(&frame).await {
                tracing::debug!(connection_id = %conn.id(), error = %e, "send failed");
                break;
            }
        }
        let _ = conn.close().await;
    });
    tx
}

/// Handles one accepted connection from accept to close (server side).
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    node: MembershipHandle,
    codec: C,
) -> Result<(), RosterError> {
    let connection_id = conn.id();
    tracing::debug!(%connection_id, "handling new connection");

    let conn = Arc::new(conn);
    let link = spawn_writer(Arc::clone(&conn));

    // Welcome goes out before any membership frame the node might queue.
    let welcome = codec.encode(&Envelope::from(SystemMessage::Welcome {
        connection_id,
    }))?;
    let _ = link.try_send(welcome);

    node.attach(connection_id, link).await?;
    let _guard = LinkGuard::new(connection_id, node.clone());

    read_loop(&conn, &codec, &node, connection_id).await;

    // _guard drops here → node.lost fires.
    Ok(())
}

/// Reads envelopes until the connection ends, attributing every
/// membership message to `from`.
pub(crate) async fn read_loop<C: Codec>(
    conn: &WebSocketConnection,
    codec: &C,
    node: &MembershipHandle,
    from: ConnectionId,
) {
    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(connection_id = %from, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(connection_id = %from, error = %e, "recv error");
                break;
            }
        };

        let envelope: Envelope = match codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(connection_id = %from, error = %e, "failed to decode envelope");
                continue;
            }
        };

        match envelope {
            Envelope::Membership(message) => {
                if node.inbound(from, message).await.is_err() {
                    tracing::debug!(connection_id = %from, "membership node stopped");
                    break;
                }
            }
            Envelope::System(SystemMessage::Disconnect { reason }) => {
                tracing::info!(connection_id = %from, %reason, "peer disconnected");
                break;
            }
            Envelope::System(SystemMessage::Welcome { .. }) => {
                tracing::debug!(connection_id = %from, "ignoring unexpected welcome");
            }
        }
    }
}
