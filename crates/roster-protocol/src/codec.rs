//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The rest of Roster doesn't care HOW values are serialized: it just
//! needs something that implements the [`Codec`] trait.
//!
//! The same codec is used at two levels:
//! - whole wire frames ([`Envelope`](crate::Envelope)), and
//! - individual player records, which the server stores and forwards
//!   as opaque [`EncodedRecord`] bytes without ever re-encoding them.
//!
//! Sequences (a list of connection ids, a list of encoded records) need no
//! dedicated methods: `Vec<T>` is `Serialize`/`DeserializeOwned` whenever
//! `T` is, so [`Codec::encode`] and [`Codec::decode`] cover them.

use serde::{de::DeserializeOwned, Serialize};

use crate::{EncodedRecord, PlayerRecord, ProtocolError};

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds
///
/// - `Send + Sync` → the codec can be shared between the node task and
///   every connection task.
/// - `'static` → it owns everything it needs, so it can live inside
///   long-running tasks.
///
/// ## Round-trip law
///
/// For every value `x` the codec can encode, `decode(encode(x)) == x`.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::MalformedPayload` if the bytes are
    /// malformed, incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;

    /// Encodes a player record into the opaque form the server stores.
    fn encode_record(
        &self,
        record: &PlayerRecord,
    ) -> Result<EncodedRecord, ProtocolError> {
        self.encode(record).map(EncodedRecord::new)
    }

    /// Decodes a record previously produced by [`encode_record`](Self::encode_record).
    fn decode_record(
        &self,
        encoded: &EncodedRecord,
    ) -> Result<PlayerRecord, ProtocolError> {
        self.decode(encoded.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON is human-readable, which makes membership traffic easy to inspect
/// in logs and browser tools. This is behind the `json` feature flag
/// (enabled by default).
///
/// ## Example
///
/// ```rust
/// use roster_protocol::{Codec, JsonCodec, PlayerRecord};
///
/// let codec = JsonCodec;
/// let alice = PlayerRecord::new("Alice");
///
/// let encoded = codec.encode_record(&alice).unwrap();
/// assert_eq!(encoded.as_bytes(), br#"{"display_name":"Alice"}"#);
///
/// let decoded = codec.decode_record(&encoded).unwrap();
/// assert_eq!(decoded, alice);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::MalformedPayload)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::ConnectionId;

    fn alice() -> PlayerRecord {
        PlayerRecord::new("Alice").with_attribute("color", "teal")
    }

    #[test]
    fn test_encode_record_round_trip() {
        let codec = JsonCodec;
        let encoded = codec.encode_record(&alice()).unwrap();
        assert_eq!(codec.decode_record(&encoded).unwrap(), alice());
    }

    #[test]
    fn test_decode_record_garbage_is_malformed() {
        let codec = JsonCodec;
        let garbage = EncodedRecord::new(b"not json at all".to_vec());
        let result = codec.decode_record(&garbage);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_record_missing_display_name_is_malformed() {
        let codec = JsonCodec;
        let wrong = EncodedRecord::new(br#"{"name":"Alice"}"#.to_vec());
        assert!(matches!(
            codec.decode_record(&wrong),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_id_sequence_uses_generic_encode() {
        // The "array variant" for ids is just encode::<Vec<ConnectionId>>.
        let codec = JsonCodec;
        let ids = vec![ConnectionId::new(0), ConnectionId::new(1)];
        let bytes = codec.encode(&ids).unwrap();
        assert_eq!(bytes, b"[0,1]");
        let back: Vec<ConnectionId> = codec.decode(&bytes).unwrap();
        assert_eq!(back, ids);
    }

    #[test]
    fn test_record_sequence_uses_generic_encode() {
        let codec = JsonCodec;
        let records = vec![
            codec.encode_record(&PlayerRecord::new("Host")).unwrap(),
            codec.encode_record(&alice()).unwrap(),
        ];
        let bytes = codec.encode(&records).unwrap();
        let back: Vec<EncodedRecord> = codec.decode(&bytes).unwrap();
        assert_eq!(back, records);
    }

    fn record_strategy() -> impl Strategy<Value = PlayerRecord> {
        (
            ".{0,24}",
            prop::collection::btree_map("[a-z_]{1,8}", ".{0,12}", 0..4),
        )
            .prop_map(|(name, attributes)| {
                attributes
                    .into_iter()
                    .fold(PlayerRecord::new(name), |r, (k, v)| {
                        r.with_attribute(k, v)
                    })
            })
    }

    proptest! {
        #[test]
        fn test_record_round_trip_law(record in record_strategy()) {
            let codec = JsonCodec;
            let encoded = codec.encode_record(&record).unwrap();
            prop_assert_eq!(codec.decode_record(&encoded).unwrap(), record);
        }
    }
}
