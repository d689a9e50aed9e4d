//! Message carrier: the minimal view of an inbound message the routing core
//! needs — an address string, a handful of reserved routing properties, and
//! an optional message-group id. Wire decoding, persistence, and the rest of
//! a message's payload are owned by the post-office; this crate only ever
//! reads/writes the properties named below.

use bytes::Bytes;
use hashbrown::HashMap;

/// Scale-down sidechannel: big-endian sequence of 64-bit remote queue ids,
/// translated to local binding ids and consumed by dispatch step 2.
pub const HDR_SCALEDOWN_TO_IDS: &str = "_AMQ_SCALEDOWN_IDS";

/// Explicit cluster routing directive: big-endian sequence of 64-bit local
/// binding ids, consumed by dispatch step 4.
pub const HDR_ROUTE_TO_IDS: &str = "_AMQ_ROUTE_TO_IDS";

/// Subset of `HDR_ROUTE_TO_IDS` that must be routed with the acknowledging
/// variant (`Binding::route_with_ack`).
pub const HDR_ROUTE_TO_ACK_IDS: &str = "_AMQ_ROUTE_TO_ACK_IDS";

/// Well-known property carrying the message-group id used by §4.5's
/// strict-ordering protocol.
pub const HDR_GROUP_ID: &str = "_AMQ_GROUP_ID";

/// Encode a list of 64-bit ids as a big-endian byte sequence (8 bytes each).
#[must_use]
pub fn encode_ids(ids: &[u64]) -> Bytes {
    let mut buf = Vec::with_capacity(ids.len() * 8);
    for id in ids {
        buf.extend_from_slice(&id.to_be_bytes());
    }
    Bytes::from(buf)
}

/// Decode a big-endian sequence of 64-bit ids. Trailing bytes that don't form
/// a full 8-byte chunk are ignored (defensive against a malformed directive).
#[must_use]
pub fn decode_ids(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(chunk);
            u64::from_be_bytes(arr)
        })
        .collect()
}

/// The subset of a broker message the routing core needs to read and mutate.
///
/// Implemented here by [`Message`] for tests and standalone use; the
/// post-office's real message type implements this trait directly over its
/// own wire representation rather than copying into this shape.
pub trait RoutableMessage {
    /// Full address string, e.g. `"orders"` or `"orders::q2"` (FQQN).
    fn address(&self) -> &str;

    /// Read a reserved property without consuming it.
    fn get_property(&self, key: &str) -> Option<&[u8]>;

    /// Remove and return a reserved property (dispatch steps 2 and 4 consume
    /// the headers they act on).
    fn remove_property(&mut self, key: &str) -> Option<Bytes>;

    /// Set (or overwrite) a reserved property.
    fn set_property(&mut self, key: &str, value: Bytes);

    /// Convenience accessor for [`HDR_GROUP_ID`].
    fn group_id(&self) -> Option<&[u8]> {
        self.get_property(HDR_GROUP_ID)
    }
}

/// A minimal, owned implementation of [`RoutableMessage`] for tests and
/// callers that don't already have their own message type.
#[derive(Debug, Clone, Default)]
pub struct Message {
    address: String,
    properties: HashMap<String, Bytes>,
}

impl Message {
    /// Create a message bound for `address` with no properties set.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            properties: HashMap::new(),
        }
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Builder-style group id setter.
    #[must_use]
    pub fn with_group_id(self, group_id: impl AsRef<str>) -> Self {
        self.with_property(HDR_GROUP_ID, Bytes::copy_from_slice(group_id.as_ref().as_bytes()))
    }
}

impl RoutableMessage for Message {
    fn address(&self) -> &str {
        &self.address
    }

    fn get_property(&self, key: &str) -> Option<&[u8]> {
        self.properties.get(key).map(Bytes::as_ref)
    }

    fn remove_property(&mut self, key: &str) -> Option<Bytes> {
        self.properties.remove(key)
    }

    fn set_property(&mut self, key: &str, value: Bytes) {
        self.properties.insert(key.to_string(), value);
    }
}
