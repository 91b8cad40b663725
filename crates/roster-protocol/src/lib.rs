//! Wire protocol for Roster.
//!
//! This crate defines the "language" that participants speak while keeping
//! membership in sync:
//!
//! - **Types** ([`PlayerRecord`], [`EncodedRecord`], [`MembershipMessage`],
//!   [`Envelope`]): what travels on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those values are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and membership
//! (registries and views). It doesn't know who is connected: it only
//! knows how to serialize and deserialize what they say.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Membership (registry / view)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use roster_transport::ConnectionId;
pub use types::{
    EncodedRecord, Envelope, MembershipMessage, PlayerRecord, SystemMessage,
};
