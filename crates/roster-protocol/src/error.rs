//! Error types for the protocol layer.
//!
//! Each crate in Roster defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in serialization or in the
//! shape of a message, not in networking or membership bookkeeping.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: the bytes are not valid for the expected
    /// type. Common causes are truncated payloads, missing required
    /// fields, or a peer speaking a different format.
    ///
    /// Inside a join broadcast this is isolated to the one entry that
    /// failed; the remaining entries are still applied.
    #[cfg(feature = "json")]
    #[error("malformed payload: {0}")]
    MalformedPayload(serde_json::Error),

    /// The message decoded but violates protocol rules, e.g. a join
    /// broadcast whose id and record sequences differ in length.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
