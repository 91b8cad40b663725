//! Error types for the membership layer.

use roster_protocol::{ConnectionId, ProtocolError};

/// Errors that can occur during membership operations.
///
/// A duplicate join request is deliberately NOT an error: the server
/// treats it as an already-completed join so retransmissions are harmless.
#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    /// No player with this id is in the local view. Usually means the
    /// caller asked before the join broadcast for that id was processed.
    #[error("player {0} not found")]
    NotFound(ConnectionId),

    /// `id_at` was called with an index past the end of the registry.
    #[error("index {index} out of range for {count} registered players")]
    IndexOutOfRange { index: usize, count: usize },

    /// A server-only operation was attempted on a client-role coordinator.
    #[error("operation requires the server role")]
    NotServer,

    /// A coordinator is already live for this slot.
    #[error("a membership coordinator is already active")]
    AlreadyActive,

    /// Encoding or decoding a record or message failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
