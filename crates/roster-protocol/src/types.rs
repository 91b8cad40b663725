//! Core protocol types for Roster's wire format.
//!
//! Every type here is either carried inside a message or IS a message:
//! the participant description ([`PlayerRecord`]), its opaque stored form
//! ([`EncodedRecord`]), the three membership messages, and the frame that
//! wraps them on a connection.

use std::collections::BTreeMap;
use std::fmt;

use roster_transport::ConnectionId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PlayerRecord
// ---------------------------------------------------------------------------

/// The description a participant publishes about itself.
///
/// A record carries no identifier. It only becomes "player N" once the
/// server pairs it with the [`ConnectionId`] it arrived on.
///
/// Records are built locally before joining, sent once in the join
/// request, and never modified afterwards.
///
/// `attributes` holds any extra participant-chosen fields (avatar, color,
/// team...). It is omitted from the encoding when empty, so a plain record
/// encodes as `{"display_name":"Alice"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Human-readable name shown to other participants.
    pub display_name: String,

    /// Extension fields, kept sorted so encodings are deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl PlayerRecord {
    /// Creates a record with just a display name.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style setter for one extension field.
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Looks up an extension field.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

impl fmt::Display for PlayerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

// ---------------------------------------------------------------------------
// EncodedRecord
// ---------------------------------------------------------------------------

/// A [`PlayerRecord`] as produced by [`Codec::encode_record`](crate::Codec::encode_record).
///
/// The server never looks inside these: it stores them exactly as they
/// arrived in the join request and forwards them in every join broadcast.
/// Only the receiving side decodes them, one entry at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedRecord(Vec<u8>);

impl EncodedRecord {
    /// Wraps bytes produced by a codec.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrows the raw encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the encoded length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no bytes are held.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// MembershipMessage
// ---------------------------------------------------------------------------

/// The three messages of the membership protocol.
///
/// ```text
/// participant ──JoinRequest──→ server
/// server ──JoinBroadcast──→ everyone (full registry snapshot)
/// server ──LeaveBroadcast──→ everyone still connected
/// ```
///
/// Internally tagged, so a leave looks like
/// `{ "type": "LeaveBroadcast", "connection_id": 1 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MembershipMessage {
    /// Participant → server: "register me under this connection".
    JoinRequest {
        connection_id: ConnectionId,
        record: EncodedRecord,
    },

    /// Server → all: the entire registry as two index-aligned sequences.
    ///
    /// Carrying the full snapshot instead of a delta means one message is
    /// enough for any receiver to catch up, whatever it missed before.
    JoinBroadcast {
        ids: Vec<ConnectionId>,
        records: Vec<EncodedRecord>,
    },

    /// Server → remaining participants: "this connection is gone".
    LeaveBroadcast { connection_id: ConnectionId },
}

impl MembershipMessage {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRequest { .. } => "JoinRequest",
            Self::JoinBroadcast { .. } => "JoinBroadcast",
            Self::LeaveBroadcast { .. } => "LeaveBroadcast",
        }
    }
}

// ---------------------------------------------------------------------------
// SystemMessage and Envelope
// ---------------------------------------------------------------------------

/// Connection plumbing that is not part of membership itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
    /// Server → new client: "you are this connection".
    ///
    /// This is the client's connection-established signal; only after
    /// receiving it does the client know the id to join under.
    Welcome { connection_id: ConnectionId },

    /// Either direction: "I'm disconnecting."
    Disconnect { reason: String },
}

/// The top-level frame. Every message on a connection is an `Envelope`.
///
/// Adjacently tagged, so the receiver can tell plumbing from membership
/// traffic before looking at the body:
///   `{ "type": "Membership", "data": { "type": "LeaveBroadcast", ... } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Envelope {
    /// Connection plumbing.
    System(SystemMessage),
    /// A membership protocol message.
    Membership(MembershipMessage),
}

impl From<MembershipMessage> for Envelope {
    fn from(msg: MembershipMessage) -> Self {
        Self::Membership(msg)
    }
}

impl From<SystemMessage> for Envelope {
    fn from(msg: SystemMessage) -> Self {
        Self::System(msg)
    }
}

// =========================================================================
// Tests
// =========================================================================
