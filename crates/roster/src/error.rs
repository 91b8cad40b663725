//! Unified error type for Roster.

use roster_membership::MembershipError;
use roster_protocol::ProtocolError;
use roster_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    /// A transport-level error (bind, connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A membership-level error (not found, out of range, already active).
    #[error(transparent)]
    Membership(#[from] MembershipError),

    /// The membership node has stopped, e.g. after the client lost its
    /// server or the node was shut down.
    #[error("membership node is no longer running")]
    NodeUnavailable,

    /// The server did not open the session with a `Welcome`.
    #[error("handshake failed: {0}")]
    Handshake(String),
}

#[cfg(test)]
mod tests {
    use roster_protocol::ConnectionId;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let roster_err: RosterError = err.into();
        assert!(matches!(roster_err, RosterError::Transport(_)));
        assert!(roster_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let roster_err: RosterError = err.into();
        assert!(matches!(roster_err, RosterError::Protocol(_)));
    }

    #[test]
    fn test_from_membership_error() {
        let err = MembershipError::NotFound(ConnectionId::new(1));
        let roster_err: RosterError = err.into();
        assert!(matches!(roster_err, RosterError::Membership(_)));
        assert_eq!(roster_err.to_string(), "player conn-1 not found");
    }
}
